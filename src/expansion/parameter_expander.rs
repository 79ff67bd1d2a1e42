use super::parameter_source::{ParameterSource, VarPool};
use crate::config::{ConfigResult, ConfigurationError};
use crate::models::ParameterSet;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;
use tracing::debug;

/// `${name}` placeholder, surrounding whitespace allowed
const PLACEHOLDER: &str = r"\$\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}";

fn placeholder_pattern() -> ConfigResult<&'static Regex> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(PLACEHOLDER))
        .as_ref()
        .map_err(|e| {
            ConfigurationError::invalid_task_parameters(format!("placeholder pattern: {e}"))
        })
}

/// Expands a parameter source into an ordered plan
#[derive(Debug, Clone, Copy)]
pub struct ParameterExpander {
    max_sub_workflow_instances: u32,
    allow_empty: bool,
}

impl ParameterExpander {
    pub fn new(max_sub_workflow_instances: u32, allow_empty: bool) -> Self {
        Self {
            max_sub_workflow_instances,
            allow_empty,
        }
    }

    /// Produce the parameter sets for a source.
    ///
    /// Index `i` of the result is the parameter set with index `i`. For an
    /// expression source the first declared parameter varies slowest.
    pub fn expand(
        &self,
        source: &ParameterSource,
        upstream: &VarPool,
    ) -> ConfigResult<Vec<ParameterSet>> {
        source.validate()?;

        let sets = match source {
            ParameterSource::Static { parameter_sets } => {
                self.check_plan_size(parameter_sets.len() as u64)?;
                parameter_sets
                    .iter()
                    .map(|set| {
                        set.iter()
                            .map(|(name, raw)| -> ConfigResult<(String, String)> {
                                Ok((name.clone(), substitute(raw, upstream, name)?))
                            })
                            .collect::<ConfigResult<BTreeMap<_, _>>>()
                    })
                    .collect::<ConfigResult<Vec<_>>>()?
            }
            ParameterSource::Expression {
                parameters,
                filter_condition,
            } => {
                let filtered = filter_set(filter_condition.as_deref());
                let mut dimensions = Vec::with_capacity(parameters.len());
                for parameter in parameters {
                    let resolved = substitute(&parameter.value, upstream, &parameter.name)?;
                    let values: Vec<String> = resolved
                        .split(parameter.separator.as_str())
                        .map(str::trim)
                        .filter(|value| !value.is_empty() && !filtered.contains(*value))
                        .map(str::to_string)
                        .collect();
                    dimensions.push((parameter.name.clone(), values));
                }

                let planned = dimensions
                    .iter()
                    .try_fold(1u64, |acc, (_, values)| acc.checked_mul(values.len() as u64))
                    .unwrap_or(u64::MAX);
                self.check_plan_size(planned)?;

                cartesian_product(&dimensions)
            }
        };

        if sets.is_empty() && !self.allow_empty {
            return Err(ConfigurationError::invalid_task_parameters(
                "parameter source resolved to zero parameter sets",
            ));
        }

        debug!(planned = sets.len(), "Expanded dynamic parameter source");

        Ok(sets
            .into_iter()
            .enumerate()
            .map(|(index, values)| ParameterSet::new(index as u32, values))
            .collect())
    }

    fn check_plan_size(&self, planned: u64) -> ConfigResult<()> {
        if planned > u64::from(self.max_sub_workflow_instances) {
            return Err(ConfigurationError::invalid_value(
                "max_sub_workflow_instances",
                self.max_sub_workflow_instances,
                format!("parameter source expands to {planned} sub-workflow instances"),
            ));
        }
        Ok(())
    }
}

fn filter_set(filter_condition: Option<&str>) -> HashSet<&str> {
    filter_condition
        .map(|condition| {
            condition
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn substitute(raw: &str, upstream: &VarPool, parameter: &str) -> ConfigResult<String> {
    let mut missing: Option<String> = None;
    let resolved = placeholder_pattern()?.replace_all(raw, |caps: &Captures| {
        match upstream.get(&caps[1]) {
            Some(value) => value.to_string(),
            None => {
                missing.get_or_insert_with(|| caps[1].to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(variable) => Err(ConfigurationError::invalid_task_parameters(format!(
            "parameter '{parameter}' references unknown upstream variable '{variable}'"
        ))),
        None => Ok(resolved.into_owned()),
    }
}

fn cartesian_product(dimensions: &[(String, Vec<String>)]) -> Vec<BTreeMap<String, String>> {
    let mut sets = vec![BTreeMap::new()];
    for (name, values) in dimensions {
        let mut next = Vec::with_capacity(sets.len() * values.len());
        for set in &sets {
            for value in values {
                let mut extended = set.clone();
                extended.insert(name.clone(), value.clone());
                next.push(extended);
            }
        }
        sets = next;
    }
    sets
}
