use super::{
    CommandId, CompletionPolicy, LaunchStatus, RunVerdict, SubWorkflowLaunch, TaskInstanceId,
    WorkflowInstanceId,
};
use crate::orchestration::completion_policy::CompletionPolicyEvaluator;
use serde::{Deserialize, Serialize};

/// Aggregate state of one dynamic task execution.
///
/// Always rebuilt from the instance ledger, so it carries nothing that is not
/// recoverable after a master crash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicTaskRun {
    parent_task_instance_id: TaskInstanceId,
    launches: Vec<SubWorkflowLaunch>,
    parallelism: u32,
    policy: CompletionPolicy,
}

/// Identifies a failing sub-workflow for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedBranch {
    pub index: u32,
    pub command_id: Option<CommandId>,
    pub sub_workflow_instance_id: Option<WorkflowInstanceId>,
    pub status: LaunchStatus,
}

impl DynamicTaskRun {
    pub fn new(
        parent_task_instance_id: TaskInstanceId,
        mut launches: Vec<SubWorkflowLaunch>,
        parallelism: u32,
        policy: CompletionPolicy,
    ) -> Self {
        launches.sort_by_key(|launch| launch.index);
        Self {
            parent_task_instance_id,
            launches,
            parallelism,
            policy,
        }
    }

    pub fn parent_task_instance_id(&self) -> TaskInstanceId {
        self.parent_task_instance_id
    }

    /// Launch rows ordered by index ascending
    pub fn launches(&self) -> &[SubWorkflowLaunch] {
        &self.launches
    }

    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }

    pub fn policy(&self) -> CompletionPolicy {
        self.policy
    }

    pub fn launch(&self, index: u32) -> Option<&SubWorkflowLaunch> {
        self.launches
            .binary_search_by_key(&index, |launch| launch.index)
            .ok()
            .map(|pos| &self.launches[pos])
    }

    pub fn count_where(&self, predicate: impl Fn(LaunchStatus) -> bool) -> usize {
        self.launches
            .iter()
            .filter(|launch| predicate(launch.status))
            .count()
    }

    /// Rows occupying a parallelism slot
    pub fn in_flight_count(&self) -> usize {
        self.count_where(|status| status.is_in_flight())
    }

    /// Planned rows in dispatch order
    pub fn planned(&self) -> impl Iterator<Item = &SubWorkflowLaunch> {
        self.launches
            .iter()
            .filter(|launch| launch.status == LaunchStatus::Planned)
    }

    pub fn all_terminal(&self) -> bool {
        self.launches.iter().all(|launch| launch.status.is_terminal())
    }

    pub fn failed_branches(&self) -> Vec<FailedBranch> {
        self.launches
            .iter()
            .filter(|launch| launch.status.is_failure())
            .map(|launch| FailedBranch {
                index: launch.index,
                command_id: launch.command_id,
                sub_workflow_instance_id: launch.sub_workflow_instance_id,
                status: launch.status,
            })
            .collect()
    }

    /// Derived overall status under the configured completion policy
    pub fn verdict(&self) -> RunVerdict {
        CompletionPolicyEvaluator::evaluate(self).verdict
    }
}
