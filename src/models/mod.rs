//! # Dynamic Task Models
//!
//! Data model of a dynamic task execution: the parameter sets produced by
//! expansion, one launch row per parameter set, and the aggregate run that the
//! orchestrator rebuilds from the ledger on every step.

pub mod completion_policy;
pub mod dynamic_task_run;
pub mod parameter_set;
pub mod sub_workflow_launch;

pub use completion_policy::{CompletionPolicy, RunVerdict};
pub use dynamic_task_run::{DynamicTaskRun, FailedBranch};
pub use parameter_set::ParameterSet;
pub use sub_workflow_launch::{
    LaunchStatus, ResolvedDefinition, SubWorkflowLaunch, SubWorkflowRef,
};

/// Identifier of a task instance inside a workflow instance
pub type TaskInstanceId = i64;

/// Identifier of a workflow instance (parent or sub-workflow)
pub type WorkflowInstanceId = i64;

/// Identifier assigned to a durable command by the command bus
pub type CommandId = uuid::Uuid;
