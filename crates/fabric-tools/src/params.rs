//! Small extraction helpers so every tool implementation reads its
//! parameters the same way instead of hand-rolling `.get().and_then()`
//! chains per call.

use fabric_protocol::{FabricError, FabricResult};
use serde_json::Value;

pub fn require_str<'a>(parameters: &'a Value, field: &str) -> FabricResult<&'a str> {
    parameters
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| FabricError::InvalidParameters(format!("missing required field {field}")))
}

pub fn optional_str<'a>(parameters: &'a Value, field: &str) -> Option<&'a str> {
    parameters.get(field).and_then(Value::as_str)
}

pub fn optional_u64(parameters: &Value, field: &str) -> Option<u64> {
    parameters.get(field).and_then(Value::as_u64)
}

pub fn optional_i64(parameters: &Value, field: &str) -> Option<i64> {
    parameters.get(field).and_then(Value::as_i64)
}

pub fn string_list(parameters: &Value, field: &str) -> Vec<String> {
    parameters
        .get(field)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_owned).collect())
        .unwrap_or_default()
}
