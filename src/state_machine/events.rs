use serde::{Deserialize, Serialize};

/// Events that drive orchestrator lifecycle transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrchestratorEvent {
    /// Begin expanding and persisting the plan
    Plan,
    /// Plan is durable in the ledger
    PlanPersisted,
    /// No free slot or no planned row left to dispatch
    Suspend,
    /// A tracked sub-workflow changed status (or reconciliation observed one)
    Wake,
    /// Completion policy reported success
    Succeed,
    /// Completion policy reported failure, or planning failed
    Fail(String),
    /// User-initiated kill of the parent
    Cancel,
}

impl OrchestratorEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::PlanPersisted => "plan_persisted",
            Self::Suspend => "suspend",
            Self::Wake => "wake",
            Self::Succeed => "succeed",
            Self::Fail(_) => "fail",
            Self::Cancel => "cancel",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    /// Create a failure event with the given reason
    pub fn fail_with_reason(reason: impl Into<String>) -> Self {
        Self::Fail(reason.into())
    }
}
