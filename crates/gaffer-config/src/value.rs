//! Tagged configuration tree.
//!
//! Every configuration document (presets, `gaffer.toml` tables, profile
//! overrides) is held as a [`ConfigValue`] before merging. Mappings keep
//! insertion order so merged output serialises the same way every time.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A configuration leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

/// A node in the configuration tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Scalar(Scalar),
    Sequence(Vec<ConfigValue>),
    Mapping(IndexMap<String, ConfigValue>),
}

impl Default for ConfigValue {
    fn default() -> Self {
        ConfigValue::Mapping(IndexMap::new())
    }
}

impl ConfigValue {
    /// An empty mapping.
    pub fn mapping() -> Self {
        Self::default()
    }

    /// Look up a key when this value is a mapping.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        match self {
            ConfigValue::Mapping(map) => map.get(key),
            _ => None,
        }
    }

    /// Look up a dotted path such as `output.path`.
    pub fn get_path(&self, path: &str) -> Option<&ConfigValue> {
        path.split('.')
            .try_fold(self, |value, segment| value.get(segment))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Scalar(Scalar::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Scalar(Scalar::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&IndexMap<String, ConfigValue>> {
        match self {
            ConfigValue::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, ConfigValue::Mapping(_))
    }

    /// Render a scalar the way it would be written in source code.
    ///
    /// Strings are returned verbatim; other scalars use their literal form.
    /// Sequences and mappings are rendered as JSON.
    pub fn to_literal(&self) -> String {
        match self {
            ConfigValue::Scalar(Scalar::String(s)) => s.clone(),
            ConfigValue::Scalar(Scalar::Bool(b)) => b.to_string(),
            ConfigValue::Scalar(Scalar::Integer(i)) => i.to_string(),
            ConfigValue::Scalar(Scalar::Float(f)) => f.to_string(),
            other => serde_json::to_string(other)
                .expect("ConfigValue serialization should never fail"),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Scalar(Scalar::String(value.to_string()))
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::Scalar(Scalar::String(value))
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Scalar(Scalar::Bool(value))
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Scalar(Scalar::Integer(value))
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Scalar(Scalar::Float(value))
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(values: Vec<T>) -> Self {
        ConfigValue::Sequence(values.into_iter().map(Into::into).collect())
    }
}

impl From<IndexMap<String, ConfigValue>> for ConfigValue {
    fn from(map: IndexMap<String, ConfigValue>) -> Self {
        ConfigValue::Mapping(map)
    }
}
