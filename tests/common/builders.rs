//! Builders for task execution contexts and their parameter blobs

use super::SUB_WORKFLOW_CODE;
use serde_json::{json, Value};
use tasker_dynamic::models::{CompletionPolicy, TaskInstanceId};
use tasker_dynamic::orchestration::TaskExecutionContext;
use tasker_dynamic::VarPool;

/// Builder for the JSON parameter blob of a dynamic task node
#[derive(Debug, Clone)]
pub struct DynamicParamsBuilder {
    values: String,
    parallelism: u32,
    policy: CompletionPolicy,
    allow_empty: bool,
    definition_code: i64,
}

impl DynamicParamsBuilder {
    /// One expression parameter `shard` over `count` values
    pub fn shards(count: u32) -> Self {
        let values = (0..count)
            .map(|i| format!("s{i}"))
            .collect::<Vec<_>>()
            .join(",");
        Self {
            values,
            parallelism: 1,
            policy: CompletionPolicy::default(),
            allow_empty: false,
            definition_code: SUB_WORKFLOW_CODE,
        }
    }

    pub fn with_values(mut self, values: &str) -> Self {
        self.values = values.to_string();
        self
    }

    pub fn parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn policy(mut self, policy: CompletionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }

    pub fn definition_code(mut self, definition_code: i64) -> Self {
        self.definition_code = definition_code;
        self
    }

    pub fn build(&self) -> Value {
        json!({
            "sub_workflow": {"definition_code": self.definition_code},
            "parameter_source": {
                "type": "expression",
                "parameters": [{"name": "shard", "value": self.values}]
            },
            "parallelism": self.parallelism,
            "completion_policy": self.policy,
            "allow_empty": self.allow_empty
        })
    }

    pub fn context(&self, task_instance_id: TaskInstanceId) -> TaskExecutionContext {
        context_with(task_instance_id, self.build(), VarPool::new())
    }
}

pub fn context_with(
    task_instance_id: TaskInstanceId,
    task_params: Value,
    var_pool: VarPool,
) -> TaskExecutionContext {
    TaskExecutionContext {
        task_instance_id,
        workflow_instance_id: 500 + task_instance_id,
        task_name: "fan_out".to_string(),
        task_params,
        var_pool,
    }
}
