use crate::config::{ConfigResult, ConfigurationError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Default separator between values of a dynamic input parameter
pub const DEFAULT_SEPARATOR: &str = ",";

/// Where a dynamic task takes its parameter sets from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterSource {
    /// Explicit list of parameter sets, launched in list order
    Static {
        parameter_sets: Vec<BTreeMap<String, String>>,
    },
    /// Cartesian product of separator-delimited value lists, which may
    /// reference upstream output through `${name}` placeholders
    Expression {
        parameters: Vec<DynamicInputParameter>,
        /// Comma-separated values removed from every parameter's value list
        #[serde(default)]
        filter_condition: Option<String>,
    },
}

/// One named dimension of an expression source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicInputParameter {
    pub name: String,
    pub value: String,
    #[serde(default = "default_separator")]
    pub separator: String,
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

impl DynamicInputParameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            separator: default_separator(),
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }
}

impl ParameterSource {
    /// Structural checks that do not need upstream output
    pub fn validate(&self) -> ConfigResult<()> {
        match self {
            Self::Static { parameter_sets } => {
                for (position, set) in parameter_sets.iter().enumerate() {
                    if set.keys().any(|name| name.trim().is_empty()) {
                        return Err(ConfigurationError::invalid_task_parameters(format!(
                            "static parameter set {position} contains an empty parameter name"
                        )));
                    }
                }
                Ok(())
            }
            Self::Expression { parameters, .. } => {
                if parameters.is_empty() {
                    return Err(ConfigurationError::invalid_task_parameters(
                        "expression source declares no parameters",
                    ));
                }
                let mut seen = HashSet::new();
                for parameter in parameters {
                    if parameter.name.trim().is_empty() {
                        return Err(ConfigurationError::invalid_task_parameters(
                            "dynamic input parameter with empty name",
                        ));
                    }
                    if parameter.separator.is_empty() {
                        return Err(ConfigurationError::invalid_task_parameters(format!(
                            "parameter '{}' has an empty separator",
                            parameter.name
                        )));
                    }
                    if !seen.insert(parameter.name.as_str()) {
                        return Err(ConfigurationError::invalid_task_parameters(format!(
                            "duplicate parameter name '{}'",
                            parameter.name
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

/// Variables produced by upstream tasks, available to `${name}` placeholders
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarPool(BTreeMap<String, String>);

impl VarPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VarPool {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
