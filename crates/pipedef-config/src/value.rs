//! Helpers for reading typed values out of a parsed YAML tree.

use crate::{ConfigError, ConfigResult};
use serde_json::{Map, Value};

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

/// A mapping, treating `~` as an empty one.
pub(crate) fn mapping_or_empty(value: &Value, field: &str) -> ConfigResult<Map<String, Value>> {
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map.clone()),
        other => Err(ConfigError::invalid(
            field,
            format!("expected a mapping, found {}", kind_of(other)),
        )),
    }
}

/// Scalars rendered as strings; YAML lets authors write `version: 1` where a
/// name is meant.
pub(crate) fn scalar_string(value: &Value, field: &str) -> ConfigResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(ConfigError::invalid(
            field,
            format!("expected a scalar, found {}", kind_of(other)),
        )),
    }
}

pub(crate) fn optional_string(value: Option<&Value>, field: &str) -> ConfigResult<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => scalar_string(v, field).map(Some),
    }
}

/// A list of names. A single scalar counts as a one-element list.
pub(crate) fn string_list(value: Option<&Value>, field: &str) -> ConfigResult<Vec<String>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| scalar_string(item, &format!("{}[{}]", field, i)))
            .collect(),
        Some(other) => scalar_string(other, field).map(|s| vec![s]),
    }
}

/// Like [`string_list`], but also accepts a mapping of names to `~`, keeping
/// the keys in order (`steps: {build: ~}`).
pub(crate) fn name_list(value: Option<&Value>, field: &str) -> ConfigResult<Vec<String>> {
    match value {
        Some(Value::Object(names)) => Ok(names.keys().cloned().collect()),
        other => string_list(other, field),
    }
}
