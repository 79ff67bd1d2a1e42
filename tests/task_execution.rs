//! End-to-end execution through the factory, the notifier and cancellation.

mod common;

use common::*;
use std::sync::Arc;
use tasker_dynamic::error::DynamicTaskError;
use tasker_dynamic::ledger::InMemoryLaunchRepository;
use tasker_dynamic::orchestration::{
    Command, DynamicTaskFactory, StatusNotifier, SubWorkflowStatus, TaskOutcomeStatus,
    DYNAMIC_TASK_TYPE,
};
use tasker_dynamic::{DynamicTaskConfig, OrchestratorState, VarPool};
use tokio::sync::oneshot;

const PARENT: i64 = 64;

#[test]
fn test_factory_registers_dynamic_task_type() {
    let harness = Harness::new();
    assert_eq!(harness.factory().task_type(), DYNAMIC_TASK_TYPE);
    assert_eq!(DYNAMIC_TASK_TYPE, "DYNAMIC");
}

#[test]
fn test_factory_rejects_invalid_config() {
    let harness = Harness::new();
    let mut config = DynamicTaskConfig::default();
    config.default_parallelism = 0;

    let err = DynamicTaskFactory::new(
        config,
        Arc::new(InMemoryLaunchRepository::new()),
        harness.collaborators(),
    )
    .unwrap_err();
    assert!(matches!(err, DynamicTaskError::Configuration(_)));
}

#[tokio::test]
async fn test_execute_runs_to_success_on_notifications() {
    let harness = Harness::new();
    let builder = DynamicParamsBuilder::shards(3).parallelism(2);
    let (_cancel, cancel_rx) = oneshot::channel();

    let factory = harness.factory();
    let context = builder.context(PARENT);
    let execution = tokio::spawn(async move { factory.execute(context, cancel_rx).await });

    assert!(harness.wait_for_in_flight(PARENT, &[0, 1]).await);
    let event = harness.event(PARENT, 1, SubWorkflowStatus::Success).await;
    assert!(harness.notifier.publish(event).await);

    assert!(harness.wait_for_in_flight(PARENT, &[0, 2]).await);
    for index in [0, 2] {
        let event = harness.event(PARENT, index, SubWorkflowStatus::Success).await;
        harness.notifier.publish(event).await;
    }

    let state = execution.await.unwrap().unwrap();
    assert_eq!(state, OrchestratorState::Succeeded);
    assert_eq!(harness.submitter.distinct_starts(), 3);
    let outcomes = harness.reporter.outcomes_for(PARENT);
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, TaskOutcomeStatus::Success);
}

#[tokio::test]
async fn test_execute_cancel_kills_in_flight_only() {
    let harness = Harness::new();
    let builder = DynamicParamsBuilder::shards(4).parallelism(2);
    let (cancel, cancel_rx) = oneshot::channel();

    let factory = harness.factory();
    let context = builder.context(PARENT);
    let execution = tokio::spawn(async move { factory.execute(context, cancel_rx).await });

    assert!(harness.wait_for_in_flight(PARENT, &[0, 1]).await);
    cancel.send(()).unwrap();

    let state = execution.await.unwrap().unwrap();
    assert_eq!(state, OrchestratorState::Killed);
    assert!(
        wait_until(|| {
            let mut killed = harness.submitter.killed_indices();
            killed.sort_unstable();
            killed == vec![0, 1]
        })
        .await
    );
    assert_eq!(harness.submitter.started_indices(), vec![0, 1]);

    let outcomes = harness.reporter.outcomes_for(PARENT);
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, TaskOutcomeStatus::Killed);
}

#[tokio::test]
async fn test_cancel_reports_failures_seen_so_far() {
    let harness = Harness::new();
    let builder = DynamicParamsBuilder::shards(3).parallelism(2);
    let mut orchestrator = harness.orchestrator(builder.context(PARENT));
    orchestrator.start().await.unwrap();
    harness.deliver(&mut orchestrator, 0, SubWorkflowStatus::Failure).await;

    assert_eq!(orchestrator.cancel().await.unwrap(), OrchestratorState::Killed);
    let outcome = orchestrator.outcome().unwrap();
    assert_eq!(outcome.status, TaskOutcomeStatus::Killed);
    assert_eq!(outcome.failed_indices(), vec![0]);

    assert!(wait_until(|| harness.submitter.killed_indices().len() == 2).await);
    let err = orchestrator.cancel().await.unwrap_err();
    assert!(matches!(err, DynamicTaskError::InvalidState(_)));
    assert_eq!(harness.reporter.outcomes_for(PARENT).len(), 1);
}

#[tokio::test]
async fn test_cancel_before_start_sends_no_kills() {
    let harness = Harness::new();
    let mut orchestrator = harness.orchestrator(DynamicParamsBuilder::shards(2).context(PARENT));

    assert_eq!(orchestrator.cancel().await.unwrap(), OrchestratorState::Killed);
    tokio::task::yield_now().await;
    assert_eq!(harness.submitter.submit_calls(), 0);
    assert_eq!(harness.reporter.outcomes_for(PARENT).len(), 1);
}

#[tokio::test]
async fn test_upstream_variables_reach_start_params() {
    let harness = Harness::new();
    let params = DynamicParamsBuilder::shards(0)
        .with_values("${regions}")
        .build();
    let context = context_with(PARENT, params, VarPool::new().with("regions", "eu, us"));

    let mut orchestrator = harness.orchestrator(context);
    orchestrator.start().await.unwrap();

    let starts = harness.submitter.start_submissions();
    assert_eq!(starts.len(), 1);
    let Command::StartSubWorkflow { start_params, .. } = &starts[0].1 else {
        panic!("expected a start command");
    };
    assert_eq!(start_params["shard"], "eu");
}

#[tokio::test]
async fn test_notifier_routes_by_parent() {
    let harness = Harness::new();
    let mut mine = harness.notifier.subscribe(PARENT);
    let _other = harness.notifier.subscribe(PARENT + 1);
    let mut orchestrator = harness.orchestrator(DynamicParamsBuilder::shards(1).context(PARENT));
    orchestrator.start().await.unwrap();

    let event = harness.event(PARENT, 0, SubWorkflowStatus::Running).await;
    assert!(harness.notifier.publish(event.clone()).await);
    assert_eq!(mine.recv().await.unwrap(), event);
    assert_eq!(harness.notifier.subscriber_count(), 2);
}

fn empty_plan() -> DynamicParamsBuilder {
    DynamicParamsBuilder::shards(0).with_values(" , ").allow_empty()
}

#[tokio::test]
async fn test_execute_recovers_from_planning_outage_without_reconcile() {
    let harness = Harness::new();
    assert_eq!(harness.config.reconcile_interval(), None);
    harness
        .repository
        .inject_unavailable(harness.config.retry.max_attempts);
    let (_cancel, cancel_rx) = oneshot::channel();

    let factory = harness.factory();
    let context = DynamicParamsBuilder::shards(1).context(PARENT);
    let execution = tokio::spawn(async move { factory.execute(context, cancel_rx).await });

    // The ledger is only read once planning has gone through
    assert!(wait_until(|| harness.submitter.distinct_starts() == 1).await);
    assert!(harness.wait_for_in_flight(PARENT, &[0]).await);
    let event = harness.event(PARENT, 0, SubWorkflowStatus::Success).await;
    assert!(harness.notifier.publish(event).await);

    let state = execution.await.unwrap().unwrap();
    assert_eq!(state, OrchestratorState::Succeeded);
    assert_eq!(harness.reporter.outcomes_for(PARENT).len(), 1);
}

#[tokio::test]
async fn test_execute_retries_failed_dispatch_after_backoff() {
    let harness = Harness::new();
    let max_attempts = harness.config.retry.max_attempts;
    harness.submitter.inject_unavailable(max_attempts);
    let (_cancel, cancel_rx) = oneshot::channel();

    let factory = harness.factory();
    let context = DynamicParamsBuilder::shards(1).context(PARENT);
    let execution = tokio::spawn(async move { factory.execute(context, cancel_rx).await });

    assert!(harness.wait_for_in_flight(PARENT, &[0]).await);
    assert_eq!(harness.submitter.submit_calls(), max_attempts + 1);
    assert_eq!(harness.submitter.distinct_starts(), 1);

    let event = harness.event(PARENT, 0, SubWorkflowStatus::Success).await;
    assert!(harness.notifier.publish(event).await);
    let state = execution.await.unwrap().unwrap();
    assert_eq!(state, OrchestratorState::Succeeded);
}

#[tokio::test]
async fn test_execute_returns_report_outage_instead_of_success() {
    let harness = Harness::new();
    let max_attempts = harness.config.retry.max_attempts;
    harness.reporter.inject_unavailable(max_attempts);
    let (_cancel, cancel_rx) = oneshot::channel();

    let err = harness
        .factory()
        .execute(empty_plan().context(PARENT), cancel_rx)
        .await
        .unwrap_err();
    assert!(err.is_transient(), "{err}");
    assert_eq!(harness.reporter.attempts(), max_attempts);
    assert!(harness.reporter.outcomes_for(PARENT).is_empty());
    assert_eq!(harness.notifier.subscriber_count(), 0);
}

#[tokio::test]
async fn test_execute_returns_rejected_report() {
    let harness = Harness::new();
    harness.reporter.set_rejecting(true);
    let (_cancel, cancel_rx) = oneshot::channel();

    let factory = harness.factory();
    let context = DynamicParamsBuilder::shards(1).context(PARENT);
    let execution = tokio::spawn(async move { factory.execute(context, cancel_rx).await });

    assert!(harness.wait_for_in_flight(PARENT, &[0]).await);
    let event = harness.event(PARENT, 0, SubWorkflowStatus::Success).await;
    assert!(harness.notifier.publish(event).await);

    let err = execution.await.unwrap().unwrap_err();
    assert!(matches!(err, DynamicTaskError::InvalidState(_)));
    assert_eq!(harness.reporter.attempts(), 1);
    assert_eq!(harness.notifier.subscriber_count(), 0);
}

#[tokio::test]
async fn test_failed_report_stays_pending_until_delivered() {
    let harness = Harness::new();
    harness
        .reporter
        .inject_unavailable(harness.config.retry.max_attempts);
    let mut orchestrator = harness.orchestrator(empty_plan().context(PARENT));

    let err = orchestrator.start().await.unwrap_err();
    assert!(err.is_transient(), "{err}");
    assert_eq!(orchestrator.state(), OrchestratorState::Succeeded);
    assert!(orchestrator.report_pending());
    assert_eq!(
        orchestrator.outcome().map(|outcome| outcome.status),
        Some(TaskOutcomeStatus::Success)
    );

    assert_eq!(
        orchestrator.report_outcome().await.unwrap(),
        OrchestratorState::Succeeded
    );
    assert!(!orchestrator.report_pending());
    assert_eq!(harness.reporter.outcomes_for(PARENT).len(), 1);

    let err = orchestrator.report_outcome().await.unwrap_err();
    assert!(matches!(err, DynamicTaskError::InvalidState(_)));
    assert_eq!(harness.reporter.outcomes_for(PARENT).len(), 1);
}

#[tokio::test]
async fn test_run_redelivers_pending_report() {
    let harness = Harness::new();
    harness
        .reporter
        .inject_unavailable(harness.config.retry.max_attempts);
    let mut orchestrator = harness.orchestrator(empty_plan().context(PARENT));
    orchestrator.start().await.unwrap_err();

    let (_cancel, cancel_rx) = oneshot::channel();
    let events = harness.notifier.subscribe(PARENT);
    let state = orchestrator.run(events, cancel_rx).await.unwrap();
    assert_eq!(state, OrchestratorState::Succeeded);
    assert_eq!(harness.reporter.outcomes_for(PARENT).len(), 1);
}

#[tokio::test]
async fn test_execute_releases_subscriptions() {
    let harness = Harness::new();
    let factory = harness.factory();

    for parent in 1..=20 {
        let (_cancel, cancel_rx) = oneshot::channel();
        let state = factory
            .execute(empty_plan().context(parent), cancel_rx)
            .await
            .unwrap();
        assert_eq!(state, OrchestratorState::Succeeded);
    }
    assert_eq!(harness.notifier.subscriber_count(), 0);
    assert_eq!(harness.reporter.outcomes().len(), 20);
}
