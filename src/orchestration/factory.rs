use super::collaborators::{Collaborators, TaskExecutionContext};
use super::orchestrator::DynamicTaskOrchestrator;
use crate::config::DynamicTaskConfig;
use crate::error::DynamicTaskResult;
use crate::ledger::{InstanceLedger, LaunchRepository};
use crate::resilience::RetryPolicy;
use crate::state_machine::OrchestratorState;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::info;

/// Task type under which the host registers dynamic tasks
pub const DYNAMIC_TASK_TYPE: &str = "DYNAMIC";

/// Builds one orchestrator per dynamic task instance with the host's
/// collaborators already bound
#[derive(Debug, Clone)]
pub struct DynamicTaskFactory {
    config: Arc<DynamicTaskConfig>,
    ledger: InstanceLedger,
    collaborators: Collaborators,
}

impl DynamicTaskFactory {
    pub fn new(
        config: DynamicTaskConfig,
        repository: Arc<dyn LaunchRepository>,
        collaborators: Collaborators,
    ) -> DynamicTaskResult<Self> {
        config.validate()?;
        let ledger = InstanceLedger::new(repository, RetryPolicy::from(&config.retry));

        Ok(Self {
            config: Arc::new(config),
            ledger,
            collaborators,
        })
    }

    pub fn task_type(&self) -> &'static str {
        DYNAMIC_TASK_TYPE
    }

    pub fn config(&self) -> &DynamicTaskConfig {
        &self.config
    }

    pub fn ledger(&self) -> &InstanceLedger {
        &self.ledger
    }

    pub fn create(&self, context: TaskExecutionContext) -> DynamicTaskOrchestrator {
        DynamicTaskOrchestrator::new(
            context,
            self.config.clone(),
            self.ledger.clone(),
            &self.collaborators,
        )
    }

    /// Run a task instance to completion.
    ///
    /// Subscribes to status events before planning so no notification
    /// emitted after the first dispatch is missed. The subscription is
    /// dropped when the run returns, whether or not it succeeded.
    pub async fn execute(
        &self,
        context: TaskExecutionContext,
        cancel: oneshot::Receiver<()>,
    ) -> DynamicTaskResult<OrchestratorState> {
        info!(
            task_instance_id = context.task_instance_id,
            workflow_instance_id = context.workflow_instance_id,
            task_name = %context.task_name,
            task_type = DYNAMIC_TASK_TYPE,
            "Executing dynamic task"
        );
        let task_instance_id = context.task_instance_id;
        let events = self.collaborators.notifier.subscribe(task_instance_id);
        let mut orchestrator = self.create(context);
        let result = orchestrator.run(events, cancel).await;
        self.collaborators.notifier.unsubscribe(task_instance_id);
        result
    }
}
