//! # Dynamic Task Orchestrator
//!
//! Drives one dynamic task instance from planning to a terminal verdict.
//!
//! ## Lifecycle
//!
//! ```text
//! INIT ─▶ PLANNING ─▶ LAUNCHING ⇄ AWAITING
//!            │            │          │
//!            ▼            ▼          ▼
//!         FAILED     SUCCEEDED | FAILED | KILLED
//! ```
//!
//! Every step reloads the run from the instance ledger and re-evaluates the
//! completion policy, so the only resumption point is durable. A new
//! orchestrator built for the same task instance after a crash replays
//! planning (a no-op for existing rows), reconciles in-flight rows against
//! the status query and continues from there.
//!
//! The orchestrator never blocks waiting for a sub-workflow. Between steps it
//! parks in `AWAITING` and is woken by [`DynamicTaskOrchestrator::handle_event`]
//! or [`DynamicTaskOrchestrator::reconcile`]; [`DynamicTaskOrchestrator::run`]
//! is a convenience loop feeding both from a subscription and a timer.
//!
//! A terminal outcome whose report to the host fails stays pending until
//! [`DynamicTaskOrchestrator::report_outcome`] delivers it.

use super::collaborators::{
    Collaborators, SubWorkflowStatusEvent, SubWorkflowStatusQuery, TaskExecutionContext,
    TaskExecutionReporter, TaskOutcome, WorkflowDefinitionResolver,
};
use super::command_dispatcher::CommandDispatcher;
use super::completion_policy::{CompletionPolicyEvaluator, Evaluation};
use super::launch_gate::LaunchGate;
use crate::config::{DynamicTaskConfig, DynamicTaskParameters};
use crate::error::{DynamicTaskError, DynamicTaskResult};
use crate::expansion::ParameterExpander;
use crate::ledger::{InstanceLedger, ObservationOutcome};
use crate::logging::{log_launch_operation, log_run_verdict};
use crate::models::{
    CommandId, CompletionPolicy, DynamicTaskRun, LaunchStatus, RunVerdict, SubWorkflowLaunch,
    TaskInstanceId, WorkflowInstanceId,
};
use crate::resilience::RetryPolicy;
use crate::state_machine::{OrchestratorEvent, OrchestratorState, OrchestratorStateMachine};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, Sleep};
use tracing::{debug, info, instrument, warn};

/// Settings fixed by planning
#[derive(Debug, Clone, Copy)]
struct RunPlan {
    parallelism: u32,
    policy: CompletionPolicy,
}

pub struct DynamicTaskOrchestrator {
    context: TaskExecutionContext,
    config: Arc<DynamicTaskConfig>,
    ledger: InstanceLedger,
    dispatcher: CommandDispatcher,
    resolver: Arc<dyn WorkflowDefinitionResolver>,
    status_query: Arc<dyn SubWorkflowStatusQuery>,
    reporter: Arc<dyn TaskExecutionReporter>,
    retry: RetryPolicy,
    state_machine: OrchestratorStateMachine,
    plan: Option<RunPlan>,
    outcome: Option<TaskOutcome>,
    report_pending: bool,
}

impl std::fmt::Debug for DynamicTaskOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicTaskOrchestrator")
            .field("task_instance_id", &self.context.task_instance_id)
            .field("state", &self.state())
            .field("plan", &self.plan)
            .field("report_pending", &self.report_pending)
            .finish_non_exhaustive()
    }
}

impl DynamicTaskOrchestrator {
    pub fn new(
        context: TaskExecutionContext,
        config: Arc<DynamicTaskConfig>,
        ledger: InstanceLedger,
        collaborators: &Collaborators,
    ) -> Self {
        let retry = RetryPolicy::from(&config.retry);
        let dispatcher =
            CommandDispatcher::new(ledger.clone(), collaborators.submitter.clone(), retry.clone());
        let state_machine = OrchestratorStateMachine::new(context.task_instance_id);

        Self {
            context,
            config,
            ledger,
            dispatcher,
            resolver: collaborators.resolver.clone(),
            status_query: collaborators.status_query.clone(),
            reporter: collaborators.reporter.clone(),
            retry,
            state_machine,
            plan: None,
            outcome: None,
            report_pending: false,
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.state_machine.current_state()
    }

    pub fn parent_task_instance_id(&self) -> TaskInstanceId {
        self.context.task_instance_id
    }

    /// Outcome reported to the host, once terminal
    pub fn outcome(&self) -> Option<&TaskOutcome> {
        self.outcome.as_ref()
    }

    /// Whether the terminal outcome has not reached the host yet
    pub fn report_pending(&self) -> bool {
        self.report_pending
    }

    /// Send the terminal outcome again after its report failed
    #[instrument(skip(self), fields(parent_task_instance_id = self.context.task_instance_id))]
    pub async fn report_outcome(&mut self) -> DynamicTaskResult<OrchestratorState> {
        let outcome = match &self.outcome {
            Some(outcome) if self.report_pending => outcome.clone(),
            _ => {
                return Err(DynamicTaskError::InvalidState(format!(
                    "no outcome awaiting report in state {}",
                    self.state()
                )))
            }
        };
        self.deliver_report(&outcome).await?;
        Ok(self.state())
    }

    /// Expand and persist the plan, reconcile what is already in flight, then
    /// fill the available slots.
    ///
    /// Configuration problems and unknown sub-workflow definitions fail the
    /// task without launching anything.
    #[instrument(skip(self), fields(parent_task_instance_id = self.context.task_instance_id))]
    pub async fn start(&mut self) -> DynamicTaskResult<OrchestratorState> {
        match self.state() {
            OrchestratorState::Init => {
                self.state_machine.transition(OrchestratorEvent::Plan)?;
            }
            OrchestratorState::Planning => {}
            other => {
                return Err(DynamicTaskError::InvalidState(format!(
                    "cannot start orchestrator in state {other}"
                )))
            }
        }

        let plan = match self.plan_run().await {
            Ok(plan) => plan,
            Err(e @ (DynamicTaskError::Configuration(_) | DynamicTaskError::NotFound(_))) => {
                return self.fail_before_launch(e.to_string()).await;
            }
            Err(e) => return Err(e),
        };
        self.plan = Some(plan);
        self.state_machine
            .transition(OrchestratorEvent::PlanPersisted)?;

        self.reconcile_in_flight().await?;
        self.advance().await
    }

    /// Record a status notification and re-evaluate
    #[instrument(
        skip(self, event),
        fields(
            parent_task_instance_id = self.context.task_instance_id,
            index = event.index,
            sub_workflow_instance_id = event.sub_workflow_instance_id
        )
    )]
    pub async fn handle_event(
        &mut self,
        event: SubWorkflowStatusEvent,
    ) -> DynamicTaskResult<OrchestratorState> {
        self.ensure_tracking("handle_event")?;

        if event.parent_task_instance_id != self.context.task_instance_id {
            warn!(
                event_parent = event.parent_task_instance_id,
                "Ignoring status event addressed to another task instance"
            );
            return Ok(self.state());
        }

        self.observe(
            event.index,
            event.command_id,
            Some(event.sub_workflow_instance_id),
            event.status.into(),
        )
        .await?;
        self.advance().await
    }

    /// Poll the status query for every in-flight row and re-evaluate.
    ///
    /// Recovers notifications that were missed while no orchestrator was
    /// subscribed.
    #[instrument(skip(self), fields(parent_task_instance_id = self.context.task_instance_id))]
    pub async fn reconcile(&mut self) -> DynamicTaskResult<OrchestratorState> {
        self.ensure_tracking("reconcile")?;

        let changed = self.reconcile_in_flight().await?;
        if changed == 0 && self.state() == OrchestratorState::Awaiting {
            return Ok(OrchestratorState::Awaiting);
        }
        self.advance().await
    }

    /// Kill every in-flight sub-workflow and move straight to `KILLED`.
    ///
    /// Planned rows that may hold a start submitted but never recorded are
    /// killed by idempotency key as well.
    ///
    /// Kill commands are fired in the background; their acknowledgment is
    /// never awaited.
    #[instrument(skip(self), fields(parent_task_instance_id = self.context.task_instance_id))]
    pub async fn cancel(&mut self) -> DynamicTaskResult<OrchestratorState> {
        if self.state().is_terminal() {
            return Err(DynamicTaskError::InvalidState(format!(
                "cannot cancel orchestrator in state {}",
                self.state()
            )));
        }

        let plan = self.plan.unwrap_or(RunPlan {
            parallelism: self.config.default_parallelism,
            policy: CompletionPolicy::default(),
        });
        let run = match self
            .ledger
            .load_run(self.context.task_instance_id, plan.parallelism, plan.policy)
            .await
        {
            Ok(run) => run,
            Err(e) => {
                warn!(error = %e, "Could not load launches while cancelling; no kills sent");
                DynamicTaskRun::new(self.context.task_instance_id, Vec::new(), plan.parallelism, plan.policy)
            }
        };

        let mut kills: Vec<SubWorkflowLaunch> = run
            .launches()
            .iter()
            .filter(|launch| launch.status.is_in_flight())
            .cloned()
            .collect();
        let in_flight = kills.len();
        if self.plan.is_some() {
            kills.extend(LaunchGate::possibly_submitted(&run).into_iter().cloned());
        }
        info!(
            in_flight = in_flight,
            unrecorded_candidates = kills.len() - in_flight,
            "Cancelling dynamic task"
        );
        self.dispatcher.kill_in_background(kills);

        self.finish(
            OrchestratorEvent::Cancel,
            TaskOutcome::killed(run.failed_branches()),
            run.launches().len(),
        )
        .await
    }

    /// Drive the orchestrator until it reaches a terminal state.
    ///
    /// Status events arrive on `events`. Sending on `cancel` cancels the run;
    /// dropping the sender does not. Transient infrastructure failures are
    /// logged and retried after the retry policy's backoff, or earlier if an
    /// event or reconcile tick arrives first. A failed report of the
    /// terminal outcome is returned as an error.
    pub async fn run(
        &mut self,
        mut events: mpsc::Receiver<SubWorkflowStatusEvent>,
        mut cancel: oneshot::Receiver<()>,
    ) -> DynamicTaskResult<OrchestratorState> {
        let mut backoff = Backoff::default();
        let resumed = self.resume().await;
        let mut state = self.absorb_transient(resumed, &mut backoff)?;
        let mut reconcile_timer = self
            .config
            .reconcile_interval()
            .map(|period| tokio::time::interval_at(Instant::now() + period, period));
        let mut events_open = true;
        let mut cancel_armed = true;

        while !state.is_terminal() {
            if !events_open && reconcile_timer.is_none() && !backoff.is_armed() {
                return Err(DynamicTaskError::InvalidState(
                    "status event channel closed and reconciliation is disabled".to_string(),
                ));
            }

            let result = tokio::select! {
                biased;

                signal = &mut cancel, if cancel_armed => match signal {
                    Ok(()) => self.cancel().await,
                    Err(_) => {
                        cancel_armed = false;
                        continue;
                    }
                },
                event = events.recv(), if events_open => match event {
                    Some(event) if self.state().is_tracking() => self.handle_event(event).await,
                    // Not planned yet; the event is recovered by reconciliation
                    Some(_) => self.resume().await,
                    None => {
                        warn!(
                            parent_task_instance_id = self.context.task_instance_id,
                            "Status event channel closed"
                        );
                        events_open = false;
                        continue;
                    }
                },
                () = backoff.wait(), if backoff.is_armed() => self.resume().await,
                _ = next_tick(&mut reconcile_timer) => self.resume().await,
            };
            state = self.absorb_transient(result, &mut backoff)?;
        }

        Ok(state)
    }

    async fn resume(&mut self) -> DynamicTaskResult<OrchestratorState> {
        match self.state() {
            OrchestratorState::Init | OrchestratorState::Planning => self.start().await,
            OrchestratorState::Launching | OrchestratorState::Awaiting => self.reconcile().await,
            _ if self.report_pending => self.report_outcome().await,
            terminal => Ok(terminal),
        }
    }

    async fn plan_run(&self) -> DynamicTaskResult<RunPlan> {
        let parameters = DynamicTaskParameters::from_json(&self.context.task_params)?;
        let expander = ParameterExpander::new(
            parameters.effective_max_instances(&self.config),
            parameters.allow_empty,
        );
        let parameter_sets =
            expander.expand(&parameters.parameter_source, &self.context.var_pool)?;

        let resolver = &self.resolver;
        let reference = &parameters.sub_workflow;
        let definition = self
            .retry
            .run("resolver.resolve", || async move { resolver.resolve(reference).await })
            .await?;

        let inserted = self
            .ledger
            .upsert_plan(self.context.task_instance_id, definition, &parameter_sets)
            .await?;

        let plan = RunPlan {
            parallelism: parameters.effective_parallelism(&self.config),
            policy: parameters.completion_policy,
        };
        info!(
            parent_task_instance_id = self.context.task_instance_id,
            task_name = %self.context.task_name,
            planned = parameter_sets.len(),
            inserted = inserted,
            parallelism = plan.parallelism,
            policy = %plan.policy,
            definition_code = definition.definition_code,
            definition_version = definition.version,
            "Dynamic task planned"
        );
        Ok(plan)
    }

    /// Evaluate, then dispatch into free slots until the run either settles
    /// or has nothing left to launch right now
    async fn advance(&mut self) -> DynamicTaskResult<OrchestratorState> {
        if self.state() == OrchestratorState::Awaiting {
            self.state_machine.transition(OrchestratorEvent::Wake)?;
        }
        let plan = self.plan.ok_or_else(|| {
            DynamicTaskError::InvalidState("orchestrator has no persisted plan".to_string())
        })?;
        let parent = self.context.task_instance_id;

        loop {
            let run = self
                .ledger
                .load_run(parent, plan.parallelism, plan.policy)
                .await?;
            let evaluation = CompletionPolicyEvaluator::evaluate(&run);

            match evaluation.verdict {
                RunVerdict::Success => {
                    return self
                        .finish(OrchestratorEvent::Succeed, TaskOutcome::success(), run.launches().len())
                        .await
                }
                RunVerdict::Failure => return self.finish_failure(&run, &evaluation).await,
                RunVerdict::Running => {}
            }

            let admitted: Vec<SubWorkflowLaunch> =
                LaunchGate::admit(&run, evaluation.suppress_remaining)
                    .into_iter()
                    .cloned()
                    .collect();
            if admitted.is_empty() {
                self.state_machine.transition(OrchestratorEvent::Suspend)?;
                debug!(
                    parent_task_instance_id = parent,
                    in_flight = run.in_flight_count(),
                    planned = run.planned().count(),
                    suppressed = evaluation.suppress_remaining,
                    "Awaiting sub-workflow status changes"
                );
                return Ok(OrchestratorState::Awaiting);
            }

            for launch in &admitted {
                self.dispatcher
                    .dispatch(
                        self.context.workflow_instance_id,
                        parent,
                        &launch.parameter_set(),
                        launch.definition,
                    )
                    .await?;
            }
        }
    }

    async fn finish_failure(
        &mut self,
        run: &DynamicTaskRun,
        evaluation: &Evaluation,
    ) -> DynamicTaskResult<OrchestratorState> {
        let mut kills: Vec<SubWorkflowLaunch> = evaluation
            .kill_requests
            .iter()
            .filter_map(|index| run.launch(*index).cloned())
            .collect();
        if run.policy() == CompletionPolicy::FailFast {
            kills.extend(LaunchGate::possibly_submitted(run).into_iter().cloned());
        }
        self.dispatcher.kill_in_background(kills);

        let failures = run.failed_branches();
        let reason = format!(
            "{} of {} sub-workflows failed under {}; first failing index {}",
            failures.len(),
            run.launches().len(),
            run.policy(),
            evaluation
                .trigger_index
                .map_or_else(|| "unknown".to_string(), |index| index.to_string()),
        );
        self.finish(
            OrchestratorEvent::fail_with_reason(reason.clone()),
            TaskOutcome::failure(failures, Some(reason)),
            run.launches().len(),
        )
        .await
    }

    async fn fail_before_launch(&mut self, reason: String) -> DynamicTaskResult<OrchestratorState> {
        warn!(
            parent_task_instance_id = self.context.task_instance_id,
            reason = %reason,
            "Dynamic task failed before launching"
        );
        self.finish(
            OrchestratorEvent::fail_with_reason(reason.clone()),
            TaskOutcome::failure(Vec::new(), Some(reason)),
            0,
        )
        .await
    }

    /// Enter a terminal state and report the outcome to the host.
    ///
    /// The state transition sticks even when the report fails; the outcome
    /// then stays pending for [`Self::report_outcome`].
    async fn finish(
        &mut self,
        event: OrchestratorEvent,
        outcome: TaskOutcome,
        planned: usize,
    ) -> DynamicTaskResult<OrchestratorState> {
        let state = self.state_machine.transition(event)?;
        let parent = self.context.task_instance_id;

        log_run_verdict(
            parent,
            outcome.status,
            planned,
            &outcome.failed_indices(),
            outcome.reason.as_deref(),
        );
        self.outcome = Some(outcome.clone());
        self.report_pending = true;

        self.deliver_report(&outcome).await?;
        Ok(state)
    }

    async fn deliver_report(&mut self, outcome: &TaskOutcome) -> DynamicTaskResult<()> {
        let parent = self.context.task_instance_id;
        let reporter = &self.reporter;
        let result = self
            .retry
            .run("reporter.report", || async move {
                reporter.report(parent, outcome.clone()).await
            })
            .await;

        match result {
            Ok(()) => {
                self.report_pending = false;
                Ok(())
            }
            Err(e) => {
                warn!(
                    parent_task_instance_id = parent,
                    status = %outcome.status,
                    error = %e,
                    "Outcome report failed; outcome kept for redelivery"
                );
                Err(e)
            }
        }
    }

    /// Record one observed status against the ledger.
    ///
    /// A row still `planned` here means the process died between submitting
    /// its command and recording it; the command id echoed by the event
    /// completes the dispatch record first.
    async fn observe(
        &self,
        index: u32,
        command_id: Option<CommandId>,
        sub_workflow_instance_id: Option<WorkflowInstanceId>,
        status: LaunchStatus,
    ) -> DynamicTaskResult<()> {
        let parent = self.context.task_instance_id;
        let launch = self.ledger.find(parent, index).await?.ok_or_else(|| {
            DynamicTaskError::conflict(parent, index, "status observed for unplanned index")
        })?;

        match (launch.command_id, command_id) {
            (None, Some(command_id)) => {
                self.ledger.record_dispatch(parent, index, command_id).await?;
                info!(
                    parent_task_instance_id = parent,
                    index = index,
                    command_id = %command_id,
                    "Recorded dispatch from status event"
                );
            }
            (None, None) => {
                warn!(
                    parent_task_instance_id = parent,
                    index = index,
                    "Status observed for undispatched launch without a command id; ignoring"
                );
                return Ok(());
            }
            (Some(recorded), Some(observed)) if recorded != observed => {
                return Err(DynamicTaskError::conflict(
                    parent,
                    index,
                    format!("status event for command {observed}, ledger holds {recorded}"),
                ));
            }
            _ => {}
        }

        let applied = self
            .ledger
            .record_observed_status(parent, index, sub_workflow_instance_id, status)
            .await?;
        if applied == ObservationOutcome::Applied {
            log_launch_operation(
                "observe",
                parent,
                index,
                launch.command_id.or(command_id),
                sub_workflow_instance_id,
                status,
            );
        }
        Ok(())
    }

    /// Returns the number of rows whose status changed
    async fn reconcile_in_flight(&self) -> DynamicTaskResult<usize> {
        let parent = self.context.task_instance_id;
        let in_flight = self
            .ledger
            .list_by_status(parent, |status| status.is_in_flight())
            .await?;

        let mut changed = 0;
        for launch in in_flight {
            let Some(command_id) = launch.command_id else {
                continue;
            };
            let status_query = &self.status_query;
            let observed = self
                .retry
                .run("status_query.find_by_command", || async move {
                    status_query.find_by_command(command_id).await
                })
                .await?;

            let Some(observed) = observed else {
                continue;
            };
            let status = LaunchStatus::from(observed.status);
            if status == launch.status {
                continue;
            }
            self.observe(
                launch.index,
                Some(command_id),
                Some(observed.sub_workflow_instance_id),
                status,
            )
            .await?;
            changed += 1;
        }

        if changed > 0 {
            debug!(parent_task_instance_id = parent, changed = changed, "Reconciled in-flight launches");
        }
        Ok(changed)
    }

    fn ensure_tracking(&self, operation: &str) -> DynamicTaskResult<()> {
        if self.state().is_tracking() {
            Ok(())
        } else {
            Err(DynamicTaskError::InvalidState(format!(
                "{operation} is not allowed in state {}",
                self.state()
            )))
        }
    }

    /// Turn a transient failure of a non-terminal step into a backoff wake-up.
    ///
    /// Errors raised once terminal come from reporting and are returned.
    fn absorb_transient(
        &self,
        result: DynamicTaskResult<OrchestratorState>,
        backoff: &mut Backoff,
    ) -> DynamicTaskResult<OrchestratorState> {
        match result {
            Ok(state) => {
                backoff.reset();
                Ok(state)
            }
            Err(e) if e.is_transient() && !self.state().is_terminal() => {
                let delay = backoff.arm(&self.retry);
                warn!(
                    parent_task_instance_id = self.context.task_instance_id,
                    state = %self.state(),
                    error = %e,
                    consecutive_failures = backoff.failures,
                    retry_in_ms = delay.as_millis() as u64,
                    "Transient failure, retrying after backoff"
                );
                Ok(self.state())
            }
            Err(e) => Err(e),
        }
    }
}

/// Wake-up scheduled after consecutive transient failures
#[derive(Debug, Default)]
struct Backoff {
    failures: u32,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Backoff {
    fn arm(&mut self, retry: &RetryPolicy) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let delay = retry.delay_for_attempt(self.failures);
        self.sleep = Some(Box::pin(tokio::time::sleep(delay)));
        delay
    }

    fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    fn reset(&mut self) {
        self.failures = 0;
        self.sleep = None;
    }

    async fn wait(&mut self) {
        if let Some(sleep) = self.sleep.as_mut() {
            sleep.await;
        }
        self.sleep = None;
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
