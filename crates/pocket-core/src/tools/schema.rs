//! Argument checks against a tool's JSON schema
//!
//! Only the subset of JSON Schema that tool descriptions actually use is
//! enforced: required keys and the primitive `type` of declared properties.

use serde_json::{Map, Value};

use crate::error::ToolError;

/// Check named arguments against an object schema
pub fn validate_arguments(schema: &Value, input: &Map<String, Value>) -> Result<(), ToolError> {
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        let missing: Vec<&str> = required
            .iter()
            .filter_map(Value::as_str)
            .filter(|key| !input.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err(ToolError::InvalidParams(format!(
                "missing required argument(s): {}",
                missing.join(", ")
            )));
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };

    for (key, value) in input {
        let Some(expected) = properties.get(key).and_then(|p| p.get("type")) else {
            continue;
        };
        if !matches_type(expected, value) {
            return Err(ToolError::InvalidParams(format!(
                "argument '{}' should be of type {}",
                key, expected
            )));
        }
    }

    Ok(())
}

fn matches_type(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => matches_named_type(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| matches_named_type(name, value)),
        _ => true,
    }
}

fn matches_named_type(name: &str, value: &Value) -> bool {
    match name {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "limit": {"type": "integer"},
                "tags": {"type": ["array", "null"]}
            },
            "required": ["path"]
        })
    }

    fn input(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_accepts_valid_arguments() {
        let args = input(json!({"path": "/tmp", "limit": 3, "tags": null}));
        assert!(validate_arguments(&schema(), &args).is_ok());
    }

    #[test]
    fn test_reports_missing_required() {
        let err = validate_arguments(&schema(), &input(json!({"limit": 3}))).unwrap_err();
        assert!(err.to_string().contains("path"));
    }

    #[test]
    fn test_rejects_wrong_type() {
        let args = input(json!({"path": "/tmp", "limit": "three"}));
        assert!(matches!(
            validate_arguments(&schema(), &args),
            Err(ToolError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_integer_rejects_float() {
        let args = input(json!({"path": "/tmp", "limit": 2.5}));
        assert!(validate_arguments(&schema(), &args).is_err());
    }

    #[test]
    fn test_undeclared_arguments_pass() {
        let args = input(json!({"path": "/tmp", "verbose": true}));
        assert!(validate_arguments(&schema(), &args).is_ok());
    }

    #[test]
    fn test_schema_without_properties() {
        let args = input(json!({"anything": 1}));
        assert!(validate_arguments(&json!({"type": "object"}), &args).is_ok());
    }
}
