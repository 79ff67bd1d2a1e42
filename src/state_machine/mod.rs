// State machine module for dynamic task orchestration
//
// Two machines live here: the lifecycle of the orchestrator driving one
// dynamic task instance, and the per-row status transitions of the ledger.

pub mod errors;
pub mod events;
pub mod guards;
pub mod orchestrator_state_machine;
pub mod states;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::OrchestratorEvent;
pub use guards::LaunchTransitionGuard;
pub use orchestrator_state_machine::OrchestratorStateMachine;
pub use states::OrchestratorState;
