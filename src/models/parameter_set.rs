use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named input values for one planned sub-workflow instance.
///
/// The index is the position of the set in the expanded plan and is the
/// idempotency key for launching. A parameter set is immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSet {
    index: u32,
    values: BTreeMap<String, String>,
}

impl ParameterSet {
    pub fn new(index: u32, values: BTreeMap<String, String>) -> Self {
        Self { index, values }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Start parameters handed to the sub-workflow, as a JSON object
    pub fn to_start_params(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_params_are_json_object() {
        let mut values = BTreeMap::new();
        values.insert("region".to_string(), "eu".to_string());
        values.insert("day".to_string(), "2026-10-01".to_string());
        let set = ParameterSet::new(3, values);

        assert_eq!(set.index(), 3);
        assert_eq!(set.get("region"), Some("eu"));
        assert_eq!(
            set.to_start_params(),
            serde_json::json!({"day": "2026-10-01", "region": "eu"})
        );
    }
}
