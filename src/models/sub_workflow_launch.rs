//! # Sub-Workflow Launch Model
//!
//! One ledger row per (parent task instance, parameter-set index).
//!
//! ## Lifecycle
//!
//! ```text
//! planned ──dispatch──▶ command_sent ──observe──▶ running ──observe──▶ success | failure | killed
//!                            └──────────────────observe──────────────────▲
//! ```
//!
//! - A `planned` row never carries a sub-workflow instance id.
//! - At most one command id is ever recorded for an index.
//! - Terminal rows (`success`, `failure`, `killed`) never change again.

use super::{CommandId, ParameterSet, TaskInstanceId, WorkflowInstanceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Status of a single sub-workflow launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LaunchStatus {
    /// Row materialized by planning, no command sent yet
    #[default]
    Planned,
    /// Start command submitted, instance not yet observed
    CommandSent,
    /// Sub-workflow instance observed running
    Running,
    Success,
    Failure,
    Killed,
}

impl LaunchStatus {
    /// Terminal statuses never transition further
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Killed)
    }

    /// Statuses that occupy a parallelism slot
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::CommandSent | Self::Running)
    }

    /// Statuses counted as a failed branch by the completion policy
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure | Self::Killed)
    }

    /// Whether the command for this row has already been submitted
    pub fn is_dispatched(&self) -> bool {
        !matches!(self, Self::Planned)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::CommandSent => "command_sent",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Killed => "killed",
        }
    }
}

impl fmt::Display for LaunchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LaunchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(Self::Planned),
            "command_sent" => Ok(Self::CommandSent),
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "killed" => Ok(Self::Killed),
            _ => Err(format!("Invalid launch status: {s}")),
        }
    }
}

/// Reference to the sub-workflow definition declared by the dynamic task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubWorkflowRef {
    pub definition_code: i64,
    /// `None` resolves to the currently released version
    #[serde(default)]
    pub version: Option<i32>,
}

/// Sub-workflow definition after resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDefinition {
    pub definition_code: i64,
    pub version: i32,
}

/// Durable ledger row for one planned sub-workflow instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubWorkflowLaunch {
    pub parent_task_instance_id: TaskInstanceId,
    pub index: u32,
    pub definition: ResolvedDefinition,
    pub parameters: BTreeMap<String, String>,
    pub command_id: Option<CommandId>,
    pub sub_workflow_instance_id: Option<WorkflowInstanceId>,
    pub status: LaunchStatus,
    pub last_observed_at: DateTime<Utc>,
}

impl SubWorkflowLaunch {
    /// Build the `planned` row for a parameter set
    pub fn planned(
        parent_task_instance_id: TaskInstanceId,
        parameter_set: &ParameterSet,
        definition: ResolvedDefinition,
    ) -> Self {
        Self {
            parent_task_instance_id,
            index: parameter_set.index(),
            definition,
            parameters: parameter_set.values().clone(),
            command_id: None,
            sub_workflow_instance_id: None,
            status: LaunchStatus::Planned,
            last_observed_at: Utc::now(),
        }
    }

    /// The parameter set this row was planned from
    pub fn parameter_set(&self) -> ParameterSet {
        ParameterSet::new(self.index, self.parameters.clone())
    }

    /// Stable key under which the start command is deduplicated by the command bus
    pub fn idempotency_key(&self) -> String {
        idempotency_key(self.parent_task_instance_id, self.index)
    }
}

/// Idempotency key of the start command for `(parent, index)`
pub fn idempotency_key(parent_task_instance_id: TaskInstanceId, index: u32) -> String {
    format!("{parent_task_instance_id}:{index}")
}
