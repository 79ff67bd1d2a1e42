//! # Orchestration Engine
//!
//! Runtime of the dynamic fan-out task type.
//!
//! ## Core Components
//!
//! - **LaunchGate**: parallelism ceiling computed from ledger rows
//! - **CommandDispatcher**: submit-then-record start commands, idempotent by index
//! - **CompletionPolicyEvaluator**: reduces row statuses into the parent verdict
//! - **DynamicTaskOrchestrator**: lifecycle driver composing the above
//! - **DynamicTaskFactory**: binds host collaborators and builds orchestrators
//! - **InProcessStatusNotifier**: channel-based status notifications for
//!   single-process hosts
//!
//! Collaborator contracts consumed from the host live in [`collaborators`].

pub mod collaborators;
pub mod command_dispatcher;
pub mod completion_policy;
pub mod factory;
pub mod launch_gate;
pub mod notifier;
pub mod orchestrator;

pub use collaborators::{
    Collaborators, Command, CommandSubmitter, ObservedInstance, StatusNotifier,
    SubWorkflowStatus, SubWorkflowStatusEvent, SubWorkflowStatusQuery, TaskExecutionContext,
    TaskExecutionReporter, TaskOutcome, TaskOutcomeStatus, WorkflowDefinitionResolver,
};
pub use command_dispatcher::{CommandDispatcher, DispatchOutcome};
pub use completion_policy::{CompletionPolicyEvaluator, Evaluation};
pub use factory::{DynamicTaskFactory, DYNAMIC_TASK_TYPE};
pub use launch_gate::LaunchGate;
pub use notifier::InProcessStatusNotifier;
pub use orchestrator::DynamicTaskOrchestrator;
