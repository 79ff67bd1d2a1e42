//! Per-task dynamic parameters
//!
//! The JSON parameter blob a dynamic task node carries in its definition.

use super::{ConfigResult, ConfigurationError, DynamicTaskConfig};
use crate::expansion::ParameterSource;
use crate::models::{CompletionPolicy, SubWorkflowRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicTaskParameters {
    /// Sub-workflow definition launched once per parameter set
    pub sub_workflow: SubWorkflowRef,

    pub parameter_source: ParameterSource,

    /// Maximum concurrently in-flight sub-workflows; falls back to
    /// `default_parallelism`
    #[serde(default)]
    pub parallelism: Option<u32>,

    #[serde(default)]
    pub completion_policy: CompletionPolicy,

    /// Plan size ceiling; falls back to the configured global ceiling
    #[serde(default)]
    pub max_sub_workflow_instances: Option<u32>,

    /// Succeed immediately when the source expands to nothing
    #[serde(default)]
    pub allow_empty: bool,
}

impl DynamicTaskParameters {
    /// Parse and validate the task's parameter blob
    pub fn from_json(value: &serde_json::Value) -> ConfigResult<Self> {
        let parameters: Self = serde_json::from_value(value.clone())
            .map_err(|e| ConfigurationError::invalid_task_parameters(e.to_string()))?;
        parameters.validate()?;
        Ok(parameters)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.parallelism == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "parallelism",
                0,
                "must be greater than zero",
            ));
        }
        if self.max_sub_workflow_instances == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "max_sub_workflow_instances",
                0,
                "must be greater than zero",
            ));
        }
        self.parameter_source.validate()
    }

    pub fn effective_parallelism(&self, config: &DynamicTaskConfig) -> u32 {
        self.parallelism.unwrap_or(config.default_parallelism)
    }

    pub fn effective_max_instances(&self, config: &DynamicTaskConfig) -> u32 {
        self.max_sub_workflow_instances
            .unwrap_or(config.max_sub_workflow_instances)
    }
}
