//! # Command Dispatcher
//!
//! Turns an admitted parameter set into a durable start command and records
//! it in the ledger. Submission always happens before the ledger write; a
//! crash in between leaves the row `planned`, and the retried dispatch
//! reuses the index-derived idempotency key so the command bus hands back
//! the original command id instead of starting a second sub-workflow.

use super::collaborators::{Command, CommandSubmitter};
use crate::error::{DynamicTaskError, DynamicTaskResult};
use crate::ledger::{DispatchRecord, InstanceLedger};
use crate::logging::log_launch_operation;
use crate::models::{
    sub_workflow_launch::idempotency_key, CommandId, LaunchStatus, ParameterSet,
    ResolvedDefinition, SubWorkflowLaunch, TaskInstanceId, WorkflowInstanceId,
};
use crate::resilience::RetryPolicy;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// What a dispatch call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Command submitted (or re-acknowledged by the bus) and recorded
    Submitted(CommandId),
    /// Ledger already showed the row as dispatched; nothing was submitted
    AlreadyDispatched,
}

#[derive(Clone)]
pub struct CommandDispatcher {
    ledger: InstanceLedger,
    submitter: Arc<dyn CommandSubmitter>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("ledger", &self.ledger)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl CommandDispatcher {
    pub fn new(
        ledger: InstanceLedger,
        submitter: Arc<dyn CommandSubmitter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            submitter,
            retry,
        }
    }

    /// Submit the start command for one parameter set, then record it.
    ///
    /// Safe to call repeatedly for the same index.
    #[instrument(skip(self, parameter_set), fields(index = parameter_set.index()))]
    pub async fn dispatch(
        &self,
        parent_workflow_instance_id: WorkflowInstanceId,
        parent_task_instance_id: TaskInstanceId,
        parameter_set: &ParameterSet,
        definition: ResolvedDefinition,
    ) -> DynamicTaskResult<DispatchOutcome> {
        let index = parameter_set.index();
        let launch = self
            .ledger
            .find(parent_task_instance_id, index)
            .await?
            .ok_or_else(|| {
                DynamicTaskError::conflict(parent_task_instance_id, index, "dispatch of unplanned index")
            })?;

        if launch.status.is_dispatched() {
            debug!(
                parent_task_instance_id = parent_task_instance_id,
                index = index,
                status = %launch.status,
                "Launch already dispatched, skipping"
            );
            return Ok(DispatchOutcome::AlreadyDispatched);
        }

        let command = Command::StartSubWorkflow {
            parent_workflow_instance_id,
            parent_task_instance_id,
            index,
            definition,
            start_params: parameter_set.to_start_params(),
            idempotency_key: idempotency_key(parent_task_instance_id, index),
        };
        let command_id = self.submit(&command, "dispatch.submit").await?;

        let record = self
            .ledger
            .record_dispatch(parent_task_instance_id, index, command_id)
            .await?;
        if record == DispatchRecord::AlreadyRecorded {
            debug!(
                parent_task_instance_id = parent_task_instance_id,
                index = index,
                command_id = %command_id,
                "Dispatch was already recorded for this command"
            );
        }

        log_launch_operation(
            "dispatch",
            parent_task_instance_id,
            index,
            Some(command_id),
            None,
            LaunchStatus::CommandSent,
        );
        Ok(DispatchOutcome::Submitted(command_id))
    }

    /// Submit a best-effort kill for a launch.
    ///
    /// The kill names the start command's idempotency key, so a row left
    /// `planned` by a crash between submit and record is still reached.
    pub async fn kill(&self, launch: &SubWorkflowLaunch) -> DynamicTaskResult<()> {
        let target = launch.idempotency_key();
        let command = Command::KillSubWorkflow {
            parent_task_instance_id: launch.parent_task_instance_id,
            index: launch.index,
            command_id: launch.command_id,
            sub_workflow_instance_id: launch.sub_workflow_instance_id,
            idempotency_key: format!("{target}:kill"),
            target_idempotency_key: target,
        };
        self.submit(&command, "dispatch.kill").await?;

        log_launch_operation(
            "kill",
            launch.parent_task_instance_id,
            launch.index,
            launch.command_id,
            launch.sub_workflow_instance_id,
            launch.status,
        );
        Ok(())
    }

    /// Fire kill commands on a background task without waiting for them
    pub fn kill_in_background(&self, launches: Vec<SubWorkflowLaunch>) {
        if launches.is_empty() {
            return;
        }
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let kills = launches.iter().map(|launch| dispatcher.kill(launch));
            for (launch, result) in launches.iter().zip(join_all(kills).await) {
                if let Err(e) = result {
                    warn!(
                        parent_task_instance_id = launch.parent_task_instance_id,
                        index = launch.index,
                        error = %e,
                        "Best-effort kill failed"
                    );
                }
            }
        });
    }

    async fn submit(&self, command: &Command, operation: &str) -> DynamicTaskResult<CommandId> {
        let submitter = &self.submitter;
        self.retry
            .run(operation, || async move {
                submitter.submit(command).await.map_err(DynamicTaskError::from)
            })
            .await
    }
}
