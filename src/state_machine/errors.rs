use crate::error::DynamicTaskError;
use crate::models::LaunchStatus;
use thiserror::Error;

/// Errors raised by the orchestrator and launch state machines
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateMachineError {
    #[error("Invalid orchestrator transition from {from} on event {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Invalid launch transition from {from} to {to}")]
    InvalidLaunchTransition { from: LaunchStatus, to: LaunchStatus },
}

/// Result type alias for state machine operations
pub type StateMachineResult<T> = Result<T, StateMachineError>;

impl From<StateMachineError> for DynamicTaskError {
    fn from(err: StateMachineError) -> Self {
        DynamicTaskError::InvalidState(err.to_string())
    }
}
