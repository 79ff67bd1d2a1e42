//! Configuration Loader
//!
//! Layers defaults, an optional TOML file and `TASKER_DYNAMIC__*` environment
//! variables with the `config` crate, then validates the result.

use super::error::{ConfigResult, ConfigurationError};
use super::DynamicTaskConfig;
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default location of the orchestrator configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/dynamic-task.toml";

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "TASKER_DYNAMIC";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration.
    ///
    /// An explicitly given file must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> ConfigResult<DynamicTaskConfig> {
        let (file_path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        debug!(
            path = %file_path.display(),
            required = required,
            "Loading dynamic task configuration"
        );

        let settings = Config::builder()
            .add_source(
                File::from(file_path.as_path())
                    .format(FileFormat::Toml)
                    .required(required),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::LoadError {
                source_name: file_path.display().to_string(),
                error: e.to_string(),
            })?;

        let config: DynamicTaskConfig = settings.try_deserialize()?;
        config.validate()?;

        info!(
            max_attempts = config.retry.max_attempts,
            reconcile_interval_ms = config.reconcile_interval_ms,
            default_parallelism = config.default_parallelism,
            "Dynamic task configuration loaded"
        );

        Ok(config)
    }

    /// Load configuration from a TOML string, without environment overrides
    pub fn from_toml_str(content: &str) -> ConfigResult<DynamicTaskConfig> {
        let config: DynamicTaskConfig = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}
