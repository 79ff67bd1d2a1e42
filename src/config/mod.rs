//! # Dynamic Task Configuration
//!
//! Process-wide settings of the dynamic task orchestrator plus the per-task
//! parameters a dynamic task node declares.
//!
//! ## Sources
//!
//! [`ConfigLoader`] layers, lowest precedence first:
//!
//! 1. Built-in defaults ([`DynamicTaskConfig::default`])
//! 2. A TOML file (`config/dynamic-task.toml` unless a path is given)
//! 3. Environment variables prefixed `TASKER_DYNAMIC`, nested with `__`
//!    (e.g. `TASKER_DYNAMIC__RETRY__MAX_ATTEMPTS=8`)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tasker_dynamic::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::load(None)?;
//! let attempts = config.retry.max_attempts;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;
pub mod task_parameters;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;
pub use task_parameters::DynamicTaskParameters;

/// Root configuration of the dynamic task orchestrator
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DynamicTaskConfig {
    /// Bounded retry applied to command submission and ledger writes
    pub retry: RetryConfig,

    /// Interval at which the driver loop reconciles in-flight rows against
    /// the status repository. `0` disables periodic reconciliation.
    pub reconcile_interval_ms: u64,

    /// Buffer size of each orchestrator's status-event subscription
    pub event_channel_capacity: usize,

    /// Ceiling on the plan size when the task does not declare its own
    pub max_sub_workflow_instances: u32,

    /// Parallelism used when the task does not declare its own
    pub default_parallelism: u32,
}

impl Default for DynamicTaskConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            reconcile_interval_ms: 30_000,
            event_channel_capacity: 256,
            max_sub_workflow_instances: 1_024,
            default_parallelism: 1,
        }
    }
}

impl DynamicTaskConfig {
    pub fn reconcile_interval(&self) -> Option<Duration> {
        (self.reconcile_interval_ms > 0).then(|| Duration::from_millis(self.reconcile_interval_ms))
    }

    /// Validate configuration invariants
    pub fn validate(&self) -> ConfigResult<()> {
        self.retry.validate()?;

        if self.event_channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "event_channel_capacity",
                self.event_channel_capacity,
                "must be greater than zero",
            ));
        }
        if self.default_parallelism == 0 {
            return Err(ConfigurationError::invalid_value(
                "default_parallelism",
                self.default_parallelism,
                "must be greater than zero",
            ));
        }
        if self.max_sub_workflow_instances == 0 {
            return Err(ConfigurationError::invalid_value(
                "max_sub_workflow_instances",
                self.max_sub_workflow_instances,
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Exponential backoff settings for transient infrastructure failures
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry.max_attempts",
                self.max_attempts,
                "must allow at least one attempt",
            ));
        }
        if self.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "retry.multiplier",
                self.multiplier,
                "must be at least 1.0",
            ));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "retry.base_delay_ms",
                self.base_delay_ms,
                format!("exceeds retry.max_delay_ms ({})", self.max_delay_ms),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DynamicTaskConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reconcile_interval(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_zero_reconcile_interval_disables_polling() {
        let config = DynamicTaskConfig {
            reconcile_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.reconcile_interval().is_none());
    }

    #[test]
    fn test_invalid_retry_rejected() {
        let mut config = DynamicTaskConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = DynamicTaskConfig::default();
        config.retry.base_delay_ms = 10_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retry.base_delay_ms"));

        let mut config = DynamicTaskConfig::default();
        config.retry.multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let config = DynamicTaskConfig {
            default_parallelism: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }
}
