//! Error types for the dynamic task orchestrator.
//!

use crate::config::ConfigurationError;
use crate::models::TaskInstanceId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DynamicTaskError {
    /// Malformed parameter source, empty plan when disallowed, bad task parameters.
    /// Fatal: the parent task fails without launching anything.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Ledger invariant violation. Indicates a defect rather than a task-level failure.
    #[error("Ledger conflict for task instance {parent_task_instance_id} index {index}: {reason}")]
    Conflict {
        parent_task_instance_id: TaskInstanceId,
        index: u32,
        reason: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    /// Command submission or ledger I/O failure. Safe to retry.
    #[error("Infrastructure error during {operation}: {reason}")]
    Infrastructure { operation: String, reason: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DynamicTaskError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn conflict(
        parent_task_instance_id: TaskInstanceId,
        index: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            parent_task_instance_id,
            index,
            reason: reason.into(),
        }
    }

    pub fn infrastructure(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Infrastructure {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Whether the failing operation may be retried with backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Infrastructure { .. })
    }

    /// Whether this error signals a defect in the orchestrator or its callers
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::InvalidState(_))
    }
}

impl From<serde_json::Error> for DynamicTaskError {
    fn from(error: serde_json::Error) -> Self {
        DynamicTaskError::Serialization(format!("JSON serialization error: {error}"))
    }
}

impl From<ConfigurationError> for DynamicTaskError {
    fn from(error: ConfigurationError) -> Self {
        DynamicTaskError::Configuration(error.to_string())
    }
}

/// Errors raised by a persistence collaborator backing the instance ledger
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RepositoryError {
    #[error("Repository unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt row for task instance {parent_task_instance_id} index {index}: {reason}")]
    CorruptRow {
        parent_task_instance_id: TaskInstanceId,
        index: u32,
        reason: String,
    },
}

impl From<RepositoryError> for DynamicTaskError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Unavailable(reason) => {
                DynamicTaskError::infrastructure("ledger", reason)
            }
            RepositoryError::CorruptRow {
                parent_task_instance_id,
                index,
                reason,
            } => DynamicTaskError::conflict(parent_task_instance_id, index, reason),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        RepositoryError::Unavailable(err.to_string())
    }
}

/// Errors raised by the command submission collaborator
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmissionError {
    #[error("Command bus unavailable: {0}")]
    Unavailable(String),

    #[error("Command rejected: {0}")]
    Rejected(String),
}

impl From<SubmissionError> for DynamicTaskError {
    fn from(error: SubmissionError) -> Self {
        match error {
            SubmissionError::Unavailable(reason) => {
                DynamicTaskError::infrastructure("command submission", reason)
            }
            SubmissionError::Rejected(reason) => {
                DynamicTaskError::InvalidState(format!("command rejected: {reason}"))
            }
        }
    }
}

pub type DynamicTaskResult<T> = Result<T, DynamicTaskError>;
