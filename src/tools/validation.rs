//! Check parsed tool arguments against the tool's declared schema.

use crate::error::{ColloquyError, Result};

use super::types::ToolParameters;

/// Top-level validation: object shape, required fields, declared property types.
pub fn validate_arguments(
    tool_name: &str,
    args: &serde_json::Value,
    parameters: &ToolParameters,
) -> Result<()> {
    let invalid = |message: String| ColloquyError::invalid_arguments(tool_name, message);
    let schema = &parameters.schema;

    let Some(obj) = args.as_object() else {
        return Err(invalid(format!(
            "expected object arguments, got {}",
            json_type_name(args)
        )));
    };

    let missing: Vec<&str> = parameters
        .required()
        .into_iter()
        .filter(|name| !obj.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        return Err(invalid(format!(
            "missing required parameter(s): {}",
            missing.join(", ")
        )));
    }

    let Some(properties) = schema.get("properties").and_then(|v| v.as_object()) else {
        return Ok(());
    };
    for (key, value) in obj {
        let expected = properties
            .get(key)
            .and_then(|p| p.get("type"))
            .and_then(|t| t.as_str());
        if let Some(expected) = expected {
            if !value_matches_type(value, expected) {
                return Err(invalid(format!(
                    "parameter '{key}' expected {expected}, got {}",
                    json_type_name(value)
                )));
            }
        }
    }
    Ok(())
}

fn value_matches_type(value: &serde_json::Value, expected: &str) -> bool {
    match expected {
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

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
