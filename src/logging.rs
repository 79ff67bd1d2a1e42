//! # Structured Logging Module
//!
//! Environment-aware structured logging for dynamic task orchestration.
//! Console output is human-readable by default and switches to JSON lines
//! when `TASKER_LOG_FORMAT=json`.

use crate::models::{CommandId, LaunchStatus, TaskInstanceId, WorkflowInstanceId};
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = std::env::var("RUST_LOG")
            .ok()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new(get_log_level(&environment)));
        let json = std::env::var("TASKER_LOG_FORMAT").is_ok_and(|format| format == "json");

        let console = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // A host process may already own the global subscriber
        if tracing_subscriber::registry().with(console).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json = json,
            "Structured logging initialized"
        );
    });
}

fn get_environment() -> String {
    std::env::var("TASKER_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log one launch-level operation (plan, dispatch, observe, kill)
pub fn log_launch_operation(
    operation: &str,
    parent_task_instance_id: TaskInstanceId,
    index: u32,
    command_id: Option<CommandId>,
    sub_workflow_instance_id: Option<WorkflowInstanceId>,
    status: LaunchStatus,
) {
    tracing::info!(
        operation = %operation,
        parent_task_instance_id = parent_task_instance_id,
        index = index,
        command_id = command_id.map(|id| id.to_string()),
        sub_workflow_instance_id = sub_workflow_instance_id,
        status = %status,
        timestamp = %Utc::now().to_rfc3339(),
        "LAUNCH_OPERATION"
    );
}

/// Log the terminal verdict a dynamic task run settled on
pub fn log_run_verdict(
    parent_task_instance_id: TaskInstanceId,
    verdict: impl std::fmt::Display,
    planned: usize,
    failed_indices: &[u32],
    details: Option<&str>,
) {
    tracing::info!(
        parent_task_instance_id = parent_task_instance_id,
        verdict = %verdict,
        planned = planned,
        failed_indices = ?failed_indices,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "RUN_VERDICT"
    );
}
