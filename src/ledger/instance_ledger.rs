use super::repository::{LaunchRepository, LaunchUpdate};
use crate::error::{DynamicTaskError, DynamicTaskResult};
use crate::models::{
    CommandId, CompletionPolicy, DynamicTaskRun, LaunchStatus, ParameterSet, ResolvedDefinition,
    SubWorkflowLaunch, TaskInstanceId, WorkflowInstanceId,
};
use crate::resilience::RetryPolicy;
use crate::state_machine::LaunchTransitionGuard;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Upper bound on compare-and-set retries for one mutation. Statuses only move
/// forward, so a row can lose at most a handful of races.
const MAX_CAS_ATTEMPTS: usize = 8;

/// Result of recording a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchRecord {
    /// Row moved from planned to command_sent
    Recorded,
    /// The same command id was already recorded
    AlreadyRecorded,
}

/// Result of recording an observed sub-workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationOutcome {
    /// Row status changed
    Applied,
    /// Observation repeated the stored status
    Unchanged,
    /// Row was already terminal with a different status; observation dropped
    IgnoredTerminal,
}

/// Invariant-enforcing facade over a [`LaunchRepository`]
#[derive(Clone)]
pub struct InstanceLedger {
    repository: Arc<dyn LaunchRepository>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for InstanceLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceLedger")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl InstanceLedger {
    pub fn new(repository: Arc<dyn LaunchRepository>, retry: RetryPolicy) -> Self {
        Self { repository, retry }
    }

    /// Materialize `planned` rows for every index not already present.
    ///
    /// Existing rows are left untouched, which makes re-planning after a
    /// restart a no-op. Returns the number of rows created.
    #[instrument(skip(self, parameter_sets), fields(planned = parameter_sets.len()))]
    pub async fn upsert_plan(
        &self,
        parent_task_instance_id: TaskInstanceId,
        definition: ResolvedDefinition,
        parameter_sets: &[ParameterSet],
    ) -> DynamicTaskResult<usize> {
        let launches: Vec<SubWorkflowLaunch> = parameter_sets
            .iter()
            .map(|set| SubWorkflowLaunch::planned(parent_task_instance_id, set, definition))
            .collect();
        let launches = launches.as_slice();
        let repository = &self.repository;

        let inserted = self
            .retry
            .run("ledger.upsert_plan", || async move {
                repository
                    .insert_missing(launches)
                    .await
                    .map_err(DynamicTaskError::from)
            })
            .await?;

        if inserted < launches.len() {
            self.warn_on_plan_drift(parent_task_instance_id, launches)
                .await?;
        }

        debug!(
            parent_task_instance_id = parent_task_instance_id,
            inserted = inserted,
            existing = launches.len() - inserted,
            "Plan materialized in ledger"
        );
        Ok(inserted)
    }

    /// Record the command submitted for an index.
    ///
    /// Idempotent for the same command id; a different command id for an
    /// index that already has one is a [`DynamicTaskError::Conflict`].
    #[instrument(skip(self))]
    pub async fn record_dispatch(
        &self,
        parent_task_instance_id: TaskInstanceId,
        index: u32,
        command_id: CommandId,
    ) -> DynamicTaskResult<DispatchRecord> {
        let update = LaunchUpdate::dispatched(command_id);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let launch = self.require(parent_task_instance_id, index).await?;

            match launch.command_id {
                Some(existing) if existing == command_id => {
                    return Ok(DispatchRecord::AlreadyRecorded)
                }
                Some(existing) => {
                    return Err(DynamicTaskError::conflict(
                        parent_task_instance_id,
                        index,
                        format!("command {existing} already recorded, refusing {command_id}"),
                    ))
                }
                None if launch.status != LaunchStatus::Planned => {
                    return Err(DynamicTaskError::conflict(
                        parent_task_instance_id,
                        index,
                        format!("row is {} without a command id", launch.status),
                    ))
                }
                None => {}
            }

            if self
                .compare_and_set(parent_task_instance_id, index, LaunchStatus::Planned, &update)
                .await?
            {
                return Ok(DispatchRecord::Recorded);
            }
        }

        Err(self.contention(parent_task_instance_id, index))
    }

    /// Record a status observed for the sub-workflow launched for an index.
    ///
    /// Repeated identical observations are no-ops and a terminal row is never
    /// overwritten.
    #[instrument(skip(self))]
    pub async fn record_observed_status(
        &self,
        parent_task_instance_id: TaskInstanceId,
        index: u32,
        sub_workflow_instance_id: Option<WorkflowInstanceId>,
        status: LaunchStatus,
    ) -> DynamicTaskResult<ObservationOutcome> {
        if !matches!(status, LaunchStatus::Running) && !status.is_terminal() {
            return Err(DynamicTaskError::InvalidState(format!(
                "{status} is not an observable sub-workflow status"
            )));
        }
        let update = LaunchUpdate::observed(status, sub_workflow_instance_id);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let launch = self.require(parent_task_instance_id, index).await?;

            if let (Some(recorded), Some(observed)) =
                (launch.sub_workflow_instance_id, sub_workflow_instance_id)
            {
                if recorded != observed {
                    return Err(DynamicTaskError::conflict(
                        parent_task_instance_id,
                        index,
                        format!("bound to sub-workflow {recorded}, observed {observed}"),
                    ));
                }
            }

            if launch.status == status {
                return Ok(ObservationOutcome::Unchanged);
            }
            if launch.status.is_terminal() {
                warn!(
                    parent_task_instance_id = parent_task_instance_id,
                    index = index,
                    recorded = %launch.status,
                    observed = %status,
                    "Dropping observation for terminal launch"
                );
                return Ok(ObservationOutcome::IgnoredTerminal);
            }
            LaunchTransitionGuard::can_transition(launch.status, status).map_err(|e| {
                DynamicTaskError::conflict(parent_task_instance_id, index, e.to_string())
            })?;

            if self
                .compare_and_set(parent_task_instance_id, index, launch.status, &update)
                .await?
            {
                return Ok(ObservationOutcome::Applied);
            }
        }

        Err(self.contention(parent_task_instance_id, index))
    }

    /// Rows of a parent whose status matches `predicate`, ordered by index
    pub async fn list_by_status(
        &self,
        parent_task_instance_id: TaskInstanceId,
        predicate: impl Fn(LaunchStatus) -> bool,
    ) -> DynamicTaskResult<Vec<SubWorkflowLaunch>> {
        Ok(self
            .list(parent_task_instance_id)
            .await?
            .into_iter()
            .filter(|launch| predicate(launch.status))
            .collect())
    }

    /// Rebuild the aggregate run from durable rows
    pub async fn load_run(
        &self,
        parent_task_instance_id: TaskInstanceId,
        parallelism: u32,
        policy: CompletionPolicy,
    ) -> DynamicTaskResult<DynamicTaskRun> {
        let launches = self.list(parent_task_instance_id).await?;
        Ok(DynamicTaskRun::new(
            parent_task_instance_id,
            launches,
            parallelism,
            policy,
        ))
    }

    pub async fn find(
        &self,
        parent_task_instance_id: TaskInstanceId,
        index: u32,
    ) -> DynamicTaskResult<Option<SubWorkflowLaunch>> {
        let repository = &self.repository;
        self.retry
            .run("ledger.find", || async move {
                repository
                    .find(parent_task_instance_id, index)
                    .await
                    .map_err(DynamicTaskError::from)
            })
            .await
    }

    async fn list(
        &self,
        parent_task_instance_id: TaskInstanceId,
    ) -> DynamicTaskResult<Vec<SubWorkflowLaunch>> {
        let repository = &self.repository;
        self.retry
            .run("ledger.list", || async move {
                repository
                    .list(parent_task_instance_id)
                    .await
                    .map_err(DynamicTaskError::from)
            })
            .await
    }

    async fn require(
        &self,
        parent_task_instance_id: TaskInstanceId,
        index: u32,
    ) -> DynamicTaskResult<SubWorkflowLaunch> {
        self.find(parent_task_instance_id, index)
            .await?
            .ok_or_else(|| {
                DynamicTaskError::conflict(parent_task_instance_id, index, "index was never planned")
            })
    }

    async fn compare_and_set(
        &self,
        parent_task_instance_id: TaskInstanceId,
        index: u32,
        expected: LaunchStatus,
        update: &LaunchUpdate,
    ) -> DynamicTaskResult<bool> {
        let repository = &self.repository;
        self.retry
            .run("ledger.compare_and_set", || async move {
                repository
                    .compare_and_set(parent_task_instance_id, index, expected, update)
                    .await
                    .map_err(DynamicTaskError::from)
            })
            .await
    }

    async fn warn_on_plan_drift(
        &self,
        parent_task_instance_id: TaskInstanceId,
        planned: &[SubWorkflowLaunch],
    ) -> DynamicTaskResult<()> {
        let existing = self.list(parent_task_instance_id).await?;
        for launch in planned {
            let drifted = existing
                .iter()
                .find(|row| row.index == launch.index)
                .is_some_and(|row| row.parameters != launch.parameters);
            if drifted {
                warn!(
                    parent_task_instance_id = parent_task_instance_id,
                    index = launch.index,
                    "Re-expanded parameters differ from the recorded plan; keeping recorded row"
                );
            }
        }
        Ok(())
    }

    fn contention(&self, parent_task_instance_id: TaskInstanceId, index: u32) -> DynamicTaskError {
        DynamicTaskError::conflict(
            parent_task_instance_id,
            index,
            "row kept changing under compare-and-set",
        )
    }
}
