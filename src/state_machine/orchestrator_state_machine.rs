use super::{
    errors::{StateMachineError, StateMachineResult},
    events::OrchestratorEvent,
    states::OrchestratorState,
};
use crate::models::TaskInstanceId;
use tracing::debug;

/// Lifecycle machine for one dynamic task orchestrator.
///
/// Holds no durable data: on resume the orchestrator restarts from `Init` and
/// replays planning against the ledger, which is a no-op for existing rows.
#[derive(Debug, Clone)]
pub struct OrchestratorStateMachine {
    parent_task_instance_id: TaskInstanceId,
    current_state: OrchestratorState,
}

impl OrchestratorStateMachine {
    pub fn new(parent_task_instance_id: TaskInstanceId) -> Self {
        Self {
            parent_task_instance_id,
            current_state: OrchestratorState::Init,
        }
    }

    pub fn current_state(&self) -> OrchestratorState {
        self.current_state
    }

    /// Apply an event, returning the new state
    pub fn transition(&mut self, event: OrchestratorEvent) -> StateMachineResult<OrchestratorState> {
        let from = self.current_state;
        let target = Self::determine_target_state(from, &event)?;

        debug!(
            parent_task_instance_id = self.parent_task_instance_id,
            from = %from,
            to = %target,
            event = event.event_type(),
            reason = event.error_message(),
            "Orchestrator transition"
        );

        self.current_state = target;
        Ok(target)
    }

    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: OrchestratorState,
        event: &OrchestratorEvent,
    ) -> StateMachineResult<OrchestratorState> {
        use OrchestratorEvent::*;
        use OrchestratorState::*;

        let target = match (current_state, event) {
            (Init, Plan) => Planning,
            (Planning, PlanPersisted) => Launching,
            (Launching, Suspend) => Awaiting,
            (Awaiting, Wake) => Launching,

            (Planning | Launching | Awaiting, Succeed) => Succeeded,
            (Init | Planning | Launching | Awaiting, Fail(_)) => Failed,

            // Cancellation from any non-terminal state
            (state, Cancel) if !state.is_terminal() => Killed,

            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}
