use crate::error::RepositoryError;
use crate::models::{
    CommandId, LaunchStatus, SubWorkflowLaunch, TaskInstanceId, WorkflowInstanceId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Column changes applied by a compare-and-set.
///
/// `None` identifiers leave the stored value untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchUpdate {
    pub status: LaunchStatus,
    pub command_id: Option<CommandId>,
    pub sub_workflow_instance_id: Option<WorkflowInstanceId>,
    pub observed_at: DateTime<Utc>,
}

impl LaunchUpdate {
    pub fn dispatched(command_id: CommandId) -> Self {
        Self {
            status: LaunchStatus::CommandSent,
            command_id: Some(command_id),
            sub_workflow_instance_id: None,
            observed_at: Utc::now(),
        }
    }

    pub fn observed(status: LaunchStatus, sub_workflow_instance_id: Option<WorkflowInstanceId>) -> Self {
        Self {
            status,
            command_id: None,
            sub_workflow_instance_id,
            observed_at: Utc::now(),
        }
    }

    /// Apply the update to an in-memory row
    pub fn apply_to(&self, launch: &mut SubWorkflowLaunch) {
        launch.status = self.status;
        if self.command_id.is_some() {
            launch.command_id = self.command_id;
        }
        if self.sub_workflow_instance_id.is_some() {
            launch.sub_workflow_instance_id = self.sub_workflow_instance_id;
        }
        launch.last_observed_at = self.observed_at;
    }
}

/// Persistence contract backing the instance ledger.
///
/// Implementations must give read-committed visibility: a mutation returned
/// as successful is durable and visible to subsequent reads.
#[async_trait]
pub trait LaunchRepository: Send + Sync {
    /// Insert every row whose `(parent_task_instance_id, index)` is absent.
    /// Existing rows are never overwritten. Returns the number inserted.
    async fn insert_missing(&self, launches: &[SubWorkflowLaunch]) -> RepositoryResult<usize>;

    async fn find(
        &self,
        parent_task_instance_id: TaskInstanceId,
        index: u32,
    ) -> RepositoryResult<Option<SubWorkflowLaunch>>;

    /// All rows of a parent, ordered by index ascending
    async fn list(
        &self,
        parent_task_instance_id: TaskInstanceId,
    ) -> RepositoryResult<Vec<SubWorkflowLaunch>>;

    /// Atomically apply `update` when the stored status equals `expected`.
    /// Returns `false` without writing when the status differs.
    async fn compare_and_set(
        &self,
        parent_task_instance_id: TaskInstanceId,
        index: u32,
        expected: LaunchStatus,
        update: &LaunchUpdate,
    ) -> RepositoryResult<bool>;
}
