//! # Collaborator Contracts
//!
//! Interfaces the orchestrator consumes from its host. The orchestrator only
//! ever holds these as trait objects, so storage and transport stay behind
//! the host's implementations.

use crate::error::{DynamicTaskResult, SubmissionError};
use crate::models::{
    CommandId, FailedBranch, LaunchStatus, ResolvedDefinition, SubWorkflowRef, TaskInstanceId,
    WorkflowInstanceId,
};
use crate::expansion::VarPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Resolves a declared sub-workflow reference to a concrete definition version
#[async_trait]
pub trait WorkflowDefinitionResolver: Send + Sync {
    /// Fails with [`crate::DynamicTaskError::NotFound`] when the definition is absent
    async fn resolve(&self, reference: &SubWorkflowRef) -> DynamicTaskResult<ResolvedDefinition>;
}

/// Durable command bus consumed at least once by the surrounding scheduler.
///
/// Submitting a command whose idempotency key was already accepted must
/// return the command id assigned the first time.
#[async_trait]
pub trait CommandSubmitter: Send + Sync {
    async fn submit(&self, command: &Command) -> Result<CommandId, SubmissionError>;
}

/// Point-in-time lookup of the sub-workflow instance created for a command
#[async_trait]
pub trait SubWorkflowStatusQuery: Send + Sync {
    /// `None` while the scheduler has not yet consumed the command
    async fn find_by_command(
        &self,
        command_id: CommandId,
    ) -> DynamicTaskResult<Option<ObservedInstance>>;
}

/// Subscription to sub-workflow status changes for one parent task instance
pub trait StatusNotifier: Send + Sync {
    fn subscribe(&self, parent_task_instance_id: TaskInstanceId)
        -> mpsc::Receiver<SubWorkflowStatusEvent>;

    /// Drop the subscription once the parent's orchestrator has stopped
    fn unsubscribe(&self, parent_task_instance_id: TaskInstanceId);
}

/// The task-execution framework hosting the orchestrator.
///
/// Receives exactly one outcome per dynamic task instance.
#[async_trait]
pub trait TaskExecutionReporter: Send + Sync {
    async fn report(
        &self,
        parent_task_instance_id: TaskInstanceId,
        outcome: TaskOutcome,
    ) -> DynamicTaskResult<()>;
}

/// Collaborators bound to every orchestrator a factory constructs
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn WorkflowDefinitionResolver>,
    pub submitter: Arc<dyn CommandSubmitter>,
    pub status_query: Arc<dyn SubWorkflowStatusQuery>,
    pub notifier: Arc<dyn StatusNotifier>,
    pub reporter: Arc<dyn TaskExecutionReporter>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Commands submitted to the command bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    StartSubWorkflow {
        parent_workflow_instance_id: WorkflowInstanceId,
        parent_task_instance_id: TaskInstanceId,
        index: u32,
        definition: ResolvedDefinition,
        start_params: serde_json::Value,
        idempotency_key: String,
    },
    /// Kill whatever the start command under `target_idempotency_key` created.
    ///
    /// `command_id` is absent when the start was submitted but never recorded.
    KillSubWorkflow {
        parent_task_instance_id: TaskInstanceId,
        index: u32,
        command_id: Option<CommandId>,
        sub_workflow_instance_id: Option<WorkflowInstanceId>,
        target_idempotency_key: String,
        idempotency_key: String,
    },
}

impl Command {
    pub fn idempotency_key(&self) -> &str {
        match self {
            Self::StartSubWorkflow {
                idempotency_key, ..
            }
            | Self::KillSubWorkflow {
                idempotency_key, ..
            } => idempotency_key,
        }
    }

    pub fn index(&self) -> u32 {
        match self {
            Self::StartSubWorkflow { index, .. } | Self::KillSubWorkflow { index, .. } => *index,
        }
    }

    pub fn is_start(&self) -> bool {
        matches!(self, Self::StartSubWorkflow { .. })
    }
}

/// Status a sub-workflow instance can be observed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubWorkflowStatus {
    Running,
    Success,
    Failure,
    Killed,
}

impl From<SubWorkflowStatus> for LaunchStatus {
    fn from(status: SubWorkflowStatus) -> Self {
        match status {
            SubWorkflowStatus::Running => LaunchStatus::Running,
            SubWorkflowStatus::Success => LaunchStatus::Success,
            SubWorkflowStatus::Failure => LaunchStatus::Failure,
            SubWorkflowStatus::Killed => LaunchStatus::Killed,
        }
    }
}

/// Result of a status query for one command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedInstance {
    pub sub_workflow_instance_id: WorkflowInstanceId,
    pub status: SubWorkflowStatus,
}

/// "Sub-workflow instance reached status X" notification.
///
/// Echoes the parent linkage carried by the start command so the event maps
/// straight onto its ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubWorkflowStatusEvent {
    pub parent_task_instance_id: TaskInstanceId,
    pub index: u32,
    pub command_id: Option<CommandId>,
    pub sub_workflow_instance_id: WorkflowInstanceId,
    pub status: SubWorkflowStatus,
    pub observed_at: DateTime<Utc>,
}

impl SubWorkflowStatusEvent {
    pub fn new(
        parent_task_instance_id: TaskInstanceId,
        index: u32,
        command_id: Option<CommandId>,
        sub_workflow_instance_id: WorkflowInstanceId,
        status: SubWorkflowStatus,
    ) -> Self {
        Self {
            parent_task_instance_id,
            index,
            command_id,
            sub_workflow_instance_id,
            status,
            observed_at: Utc::now(),
        }
    }
}

/// Everything the host hands over when a dynamic task instance starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExecutionContext {
    pub task_instance_id: TaskInstanceId,
    pub workflow_instance_id: WorkflowInstanceId,
    pub task_name: String,
    /// Raw parameter blob of the task node, parsed as `DynamicTaskParameters`
    pub task_params: serde_json::Value,
    /// Output variables of upstream tasks
    #[serde(default)]
    pub var_pool: VarPool,
}

/// Terminal status reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskOutcomeStatus {
    Success,
    Failure,
    Killed,
}

impl fmt::Display for TaskOutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failure => write!(f, "FAILURE"),
            Self::Killed => write!(f, "KILLED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub status: TaskOutcomeStatus,
    /// Failing branches, ordered by index
    pub failures: Vec<FailedBranch>,
    /// Set when the task failed before anything was launched
    pub reason: Option<String>,
}

impl TaskOutcome {
    pub fn success() -> Self {
        Self {
            status: TaskOutcomeStatus::Success,
            failures: Vec::new(),
            reason: None,
        }
    }

    pub fn failure(failures: Vec<FailedBranch>, reason: Option<String>) -> Self {
        Self {
            status: TaskOutcomeStatus::Failure,
            failures,
            reason,
        }
    }

    pub fn killed(failures: Vec<FailedBranch>) -> Self {
        Self {
            status: TaskOutcomeStatus::Killed,
            failures,
            reason: Some("parent workflow cancelled".to_string()),
        }
    }

    pub fn failed_indices(&self) -> Vec<u32> {
        self.failures.iter().map(|branch| branch.index).collect()
    }
}
