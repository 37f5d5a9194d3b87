//! Deterministic structural merge of configuration trees.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::ConfigValue;

/// The effective configuration of one target.
///
/// Produced only by [`merge`]; there is no mutating API. Shared behind an
/// `Arc` once the project is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergedConfig(ConfigValue);

impl MergedConfig {
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.0.get(key)
    }

    pub fn get_path(&self, path: &str) -> Option<&ConfigValue> {
        self.0.get_path(path)
    }

    pub fn as_value(&self) -> &ConfigValue {
        &self.0
    }

    /// Compact JSON in mapping insertion order.
    pub fn to_canonical_json(&self) -> String {
        serde_json::to_string(&self.0).expect("ConfigValue serialization should never fail")
    }
}

impl fmt::Display for MergedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_json())
    }
}

/// Merge `overrides` on top of `base`.
///
/// - sequence + sequence: `base ++ overrides`, no deduplication
/// - sequence + anything else: the override is appended as one element
/// - mapping + mapping: merged key by key; base key order first, then keys
///   only present in `overrides`
/// - anything else: the override wins
///
/// The root is always a mapping: an override that is not a mapping leaves
/// a mapping `base` unchanged, and a non-mapping `base` counts as empty.
pub fn merge(base: &ConfigValue, overrides: &ConfigValue) -> MergedConfig {
    match merge_values(base, overrides) {
        mapping @ ConfigValue::Mapping(_) => MergedConfig(mapping),
        _ if matches!(base, ConfigValue::Mapping(_)) => MergedConfig(base.clone()),
        _ => MergedConfig(ConfigValue::mapping()),
    }
}

/// Merge two arbitrary values with the rules documented on [`merge`].
pub fn merge_values(base: &ConfigValue, overrides: &ConfigValue) -> ConfigValue {
    match (base, overrides) {
        (ConfigValue::Sequence(left), ConfigValue::Sequence(right)) => {
            ConfigValue::Sequence(left.iter().chain(right).cloned().collect())
        }
        (ConfigValue::Sequence(left), single) => {
            let mut items = left.clone();
            items.push(single.clone());
            ConfigValue::Sequence(items)
        }
        (ConfigValue::Mapping(left), ConfigValue::Mapping(right)) => {
            let mut merged = left.clone();
            for (key, value) in right {
                let next = match left.get(key) {
                    Some(existing) => merge_values(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            ConfigValue::Mapping(merged)
        }
        (_, other) => other.clone(),
    }
}
