use super::errors::{StateMachineError, StateMachineResult};
use crate::models::LaunchStatus;

/// Validates status transitions of a ledger row
pub struct LaunchTransitionGuard;

impl LaunchTransitionGuard {
    /// Check whether a row may move from `from` to `to`.
    ///
    /// Repeating the current status is not a transition and is rejected here;
    /// callers treat identical observations as no-ops before asking.
    pub fn can_transition(from: LaunchStatus, to: LaunchStatus) -> StateMachineResult<()> {
        use LaunchStatus::*;

        let allowed = match (from, to) {
            (Planned, CommandSent) => true,
            (CommandSent, Running | Success | Failure | Killed) => true,
            (Running, Success | Failure | Killed) => true,
            _ => false,
        };

        if allowed {
            Ok(())
        } else {
            Err(StateMachineError::InvalidLaunchTransition { from, to })
        }
    }
}
