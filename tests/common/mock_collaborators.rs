//! Mock collaborators standing in for the host scheduler, command bus and
//! status repository.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tasker_dynamic::error::SubmissionError;
use tasker_dynamic::ledger::{InMemoryLaunchRepository, LaunchRepository};
use tasker_dynamic::models::{
    CommandId, LaunchStatus, ResolvedDefinition, SubWorkflowRef, TaskInstanceId,
    WorkflowInstanceId,
};
use tasker_dynamic::orchestration::{
    Collaborators, Command, CommandSubmitter, DynamicTaskFactory, DynamicTaskOrchestrator,
    InProcessStatusNotifier, ObservedInstance, SubWorkflowStatus, SubWorkflowStatusEvent,
    SubWorkflowStatusQuery, TaskExecutionContext, TaskExecutionReporter, TaskOutcome,
    WorkflowDefinitionResolver,
};
use tasker_dynamic::{
    DynamicTaskConfig, DynamicTaskError, DynamicTaskParameters, DynamicTaskResult,
    OrchestratorState, ParameterExpander, VarPool,
};

/// Command bus that deduplicates by idempotency key, like the real one
#[derive(Debug, Default)]
pub struct MockCommandSubmitter {
    accepted: Mutex<HashMap<String, CommandId>>,
    log: Mutex<Vec<(CommandId, Command)>>,
    unavailable: AtomicU32,
    submit_calls: AtomicU32,
}

impl MockCommandSubmitter {
    /// Fail the next `count` submissions with a transient error
    pub fn inject_unavailable(&self, count: u32) {
        self.unavailable.store(count, Ordering::SeqCst);
    }

    /// Every accepted start command, including re-submissions of a known key
    pub fn start_submissions(&self) -> Vec<(CommandId, Command)> {
        self.log
            .lock()
            .iter()
            .filter(|(_, command)| command.is_start())
            .cloned()
            .collect()
    }

    /// Distinct start commands, i.e. sub-workflows the scheduler would start
    pub fn distinct_starts(&self) -> usize {
        self.accepted
            .lock()
            .keys()
            .filter(|key| !key.ends_with(":kill"))
            .count()
    }

    pub fn started_indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self
            .start_submissions()
            .iter()
            .map(|(_, command)| command.index())
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Indices of every kill command accepted, started or not
    pub fn kill_commands(&self) -> Vec<u32> {
        self.log
            .lock()
            .iter()
            .filter(|(_, command)| !command.is_start())
            .map(|(_, command)| command.index())
            .collect()
    }

    /// Indices whose started sub-workflow a kill command reached
    pub fn killed_indices(&self) -> Vec<u32> {
        let accepted = self.accepted.lock();
        self.log
            .lock()
            .iter()
            .filter_map(|(_, command)| match command {
                Command::KillSubWorkflow {
                    index,
                    target_idempotency_key,
                    ..
                } if accepted.contains_key(target_idempotency_key) => Some(*index),
                _ => None,
            })
            .collect()
    }

    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandSubmitter for MockCommandSubmitter {
    async fn submit(&self, command: &Command) -> Result<CommandId, SubmissionError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .unavailable
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SubmissionError::Unavailable("injected outage".to_string()));
        }

        let command_id = *self
            .accepted
            .lock()
            .entry(command.idempotency_key().to_string())
            .or_insert_with(uuid::Uuid::new_v4);
        self.log.lock().push((command_id, command.clone()));
        Ok(command_id)
    }
}

/// Resolver backed by a fixed table of definition code to released version
#[derive(Debug, Default)]
pub struct StaticDefinitionResolver {
    versions: HashMap<i64, i32>,
}

impl StaticDefinitionResolver {
    pub fn with_definition(mut self, definition_code: i64, version: i32) -> Self {
        self.versions.insert(definition_code, version);
        self
    }
}

#[async_trait]
impl WorkflowDefinitionResolver for StaticDefinitionResolver {
    async fn resolve(&self, reference: &SubWorkflowRef) -> DynamicTaskResult<ResolvedDefinition> {
        let released = self
            .versions
            .get(&reference.definition_code)
            .ok_or_else(|| {
                DynamicTaskError::NotFound(format!(
                    "workflow definition {}",
                    reference.definition_code
                ))
            })?;
        Ok(ResolvedDefinition {
            definition_code: reference.definition_code,
            version: reference.version.unwrap_or(*released),
        })
    }
}

/// Status table the test scripts directly
#[derive(Debug, Default)]
pub struct ScriptedStatusQuery {
    instances: Mutex<HashMap<CommandId, ObservedInstance>>,
}

impl ScriptedStatusQuery {
    pub fn set(
        &self,
        command_id: CommandId,
        sub_workflow_instance_id: WorkflowInstanceId,
        status: SubWorkflowStatus,
    ) {
        self.instances.lock().insert(
            command_id,
            ObservedInstance {
                sub_workflow_instance_id,
                status,
            },
        );
    }
}

#[async_trait]
impl SubWorkflowStatusQuery for ScriptedStatusQuery {
    async fn find_by_command(
        &self,
        command_id: CommandId,
    ) -> DynamicTaskResult<Option<ObservedInstance>> {
        Ok(self.instances.lock().get(&command_id).copied())
    }
}

/// Reporter that records outcomes and can be made to fail
#[derive(Debug, Default)]
pub struct RecordingReporter {
    outcomes: Mutex<Vec<(TaskInstanceId, TaskOutcome)>>,
    unavailable: AtomicU32,
    rejecting: AtomicBool,
    attempts: AtomicU32,
}

impl RecordingReporter {
    /// Fail the next `count` reports with a transient error
    pub fn inject_unavailable(&self, count: u32) {
        self.unavailable.store(count, Ordering::SeqCst);
    }

    /// Fail every report with a non-retryable error until cleared
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn outcomes(&self) -> Vec<(TaskInstanceId, TaskOutcome)> {
        self.outcomes.lock().clone()
    }

    pub fn outcomes_for(&self, task_instance_id: TaskInstanceId) -> Vec<TaskOutcome> {
        self.outcomes
            .lock()
            .iter()
            .filter(|(id, _)| *id == task_instance_id)
            .map(|(_, outcome)| outcome.clone())
            .collect()
    }
}

#[async_trait]
impl TaskExecutionReporter for RecordingReporter {
    async fn report(
        &self,
        parent_task_instance_id: TaskInstanceId,
        outcome: TaskOutcome,
    ) -> DynamicTaskResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(DynamicTaskError::InvalidState(
                "host rejected the outcome".to_string(),
            ));
        }
        if self
            .unavailable
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(DynamicTaskError::infrastructure("report", "injected outage"));
        }
        self.outcomes.lock().push((parent_task_instance_id, outcome));
        Ok(())
    }
}

/// Definition every harness resolves
pub const SUB_WORKFLOW_CODE: i64 = 9_001;

/// Wires an in-memory ledger and the mocks together
pub struct Harness {
    pub repository: Arc<InMemoryLaunchRepository>,
    pub submitter: Arc<MockCommandSubmitter>,
    pub status_query: Arc<ScriptedStatusQuery>,
    pub reporter: Arc<RecordingReporter>,
    pub notifier: Arc<InProcessStatusNotifier>,
    pub resolver: Arc<StaticDefinitionResolver>,
    pub config: DynamicTaskConfig,
}

impl Harness {
    pub fn new() -> Self {
        let mut config = DynamicTaskConfig::default();
        config.retry.base_delay_ms = 1;
        config.retry.max_delay_ms = 2;
        config.reconcile_interval_ms = 0;

        Self {
            repository: Arc::new(InMemoryLaunchRepository::new()),
            submitter: Arc::new(MockCommandSubmitter::default()),
            status_query: Arc::new(ScriptedStatusQuery::default()),
            reporter: Arc::new(RecordingReporter::default()),
            notifier: Arc::new(InProcessStatusNotifier::new(64)),
            resolver: Arc::new(StaticDefinitionResolver::default().with_definition(SUB_WORKFLOW_CODE, 3)),
            config,
        }
    }

    pub fn with_config(mut self, configure: impl FnOnce(&mut DynamicTaskConfig)) -> Self {
        configure(&mut self.config);
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            resolver: self.resolver.clone(),
            submitter: self.submitter.clone(),
            status_query: self.status_query.clone(),
            notifier: self.notifier.clone(),
            reporter: self.reporter.clone(),
        }
    }

    pub fn factory(&self) -> DynamicTaskFactory {
        DynamicTaskFactory::new(
            self.config.clone(),
            self.repository.clone(),
            self.collaborators(),
        )
        .expect("harness config is valid")
    }

    /// A fresh orchestrator over the shared ledger, as built after a restart
    pub fn orchestrator(&self, context: TaskExecutionContext) -> DynamicTaskOrchestrator {
        self.factory().create(context)
    }

    /// Persist the plan a task's parameters expand to, without launching
    pub async fn seed_plan(&self, parent: TaskInstanceId, task_params: &serde_json::Value) -> usize {
        let parameters = DynamicTaskParameters::from_json(task_params).expect("valid parameters");
        let sets = ParameterExpander::new(1_000, parameters.allow_empty)
            .expand(&parameters.parameter_source, &VarPool::new())
            .expect("expandable source");
        let definition = self
            .resolver
            .resolve(&parameters.sub_workflow)
            .await
            .expect("known definition");
        self.factory()
            .ledger()
            .upsert_plan(parent, definition, &sets)
            .await
            .expect("plan persisted")
    }

    pub async fn statuses(&self, parent: TaskInstanceId) -> Vec<LaunchStatus> {
        self.repository
            .list(parent)
            .await
            .expect("in-memory list")
            .iter()
            .map(|launch| launch.status)
            .collect()
    }

    pub async fn in_flight(&self, parent: TaskInstanceId) -> Vec<u32> {
        self.repository
            .list(parent)
            .await
            .expect("in-memory list")
            .iter()
            .filter(|launch| launch.status.is_in_flight())
            .map(|launch| launch.index)
            .collect()
    }

    /// Poll the ledger until the in-flight indices match
    pub async fn wait_for_in_flight(&self, parent: TaskInstanceId, expected: &[u32]) -> bool {
        for _ in 0..100 {
            if self.in_flight(parent).await == expected {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        false
    }

    /// Build the status event the scheduler would emit for an index and make
    /// the status query agree with it
    pub async fn event(
        &self,
        parent: TaskInstanceId,
        index: u32,
        status: SubWorkflowStatus,
    ) -> SubWorkflowStatusEvent {
        let launch = self
            .repository
            .find(parent, index)
            .await
            .expect("in-memory find")
            .expect("index is planned");
        let command_id = launch.command_id.expect("index is dispatched");
        let instance = instance_id(index);
        self.status_query.set(command_id, instance, status);
        SubWorkflowStatusEvent::new(parent, index, Some(command_id), instance, status)
    }

    /// Deliver a status for an index straight to an orchestrator
    pub async fn deliver(
        &self,
        orchestrator: &mut DynamicTaskOrchestrator,
        index: u32,
        status: SubWorkflowStatus,
    ) -> OrchestratorState {
        let event = self
            .event(orchestrator.parent_task_instance_id(), index, status)
            .await;
        orchestrator
            .handle_event(event)
            .await
            .expect("status event is accepted")
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Sub-workflow instance id the scheduler assigns to an index
pub fn instance_id(index: u32) -> WorkflowInstanceId {
    10_000 + i64::from(index)
}

/// Poll `condition` until it holds or a second passes
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    condition()
}
