//! Parameter validation against tool schemas
//!
//! Covers the JSON Schema subset the catalog uses: `type`, `properties`,
//! `required`, `additionalProperties: false`, `items`, `enum`, `minimum`,
//! `maximum`, `minLength` and `minItems`. Validation stops at the first
//! violation.

use std::fmt;

use serde_json::Value;

/// First constraint a value failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// Location of the offending value (`options.temperature`, `conversation[1].role`)
    pub path: String,
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

impl std::error::Error for SchemaViolation {}

/// Validate `value` against `schema`
pub fn validate(schema: &Value, value: &Value) -> Result<(), SchemaViolation> {
    validate_at(schema, value, "")
}

fn violation(path: &str, message: impl Into<String>) -> SchemaViolation {
    SchemaViolation {
        path: path.to_string(),
        message: message.into(),
    }
}

fn child_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => value
            .as_f64()
            .is_some_and(|n| value.is_i64() || value.is_u64() || n.fract() == 0.0),
        // Unknown type keywords are not enforced
        _ => true,
    }
}

fn validate_at(schema: &Value, value: &Value, path: &str) -> Result<(), SchemaViolation> {
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };

    if let Some(expected) = schema.get("type").and_then(|t| t.as_str()) {
        if !matches_type(expected, value) {
            return Err(violation(
                path,
                format!("expected {}, got {}", expected, type_name(value)),
            ));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(value) {
            let options: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
            return Err(violation(
                path,
                format!("must be one of {}", options.join(", ")),
            ));
        }
    }

    match value {
        Value::String(s) => {
            if let Some(min) = schema.get("minLength").and_then(|m| m.as_u64()) {
                if (s.chars().count() as u64) < min {
                    return Err(violation(
                        path,
                        format!("must be at least {} characters", min),
                    ));
                }
            }
        }
        Value::Number(n) => {
            let n = n.as_f64().unwrap_or_default();
            if let Some(min) = schema.get("minimum").and_then(|m| m.as_f64()) {
                if n < min {
                    return Err(violation(path, format!("must be >= {}", min)));
                }
            }
            if let Some(max) = schema.get("maximum").and_then(|m| m.as_f64()) {
                if n > max {
                    return Err(violation(path, format!("must be <= {}", max)));
                }
            }
        }
        Value::Array(items) => {
            if let Some(min) = schema.get("minItems").and_then(|m| m.as_u64()) {
                if (items.len() as u64) < min {
                    return Err(violation(path, format!("must have at least {} items", min)));
                }
            }
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    validate_at(item_schema, item, &format!("{}[{}]", path, i))?;
                }
            }
        }
        Value::Object(fields) => {
            if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
                for name in required.iter().filter_map(|n| n.as_str()) {
                    if !fields.contains_key(name) {
                        return Err(violation(
                            path,
                            format!("missing required parameter '{}'", name),
                        ));
                    }
                }
            }

            let properties = schema.get("properties").and_then(|p| p.as_object());

            if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
                for key in fields.keys() {
                    if !properties.is_some_and(|p| p.contains_key(key)) {
                        return Err(violation(path, format!("unknown parameter '{}'", key)));
                    }
                }
            }

            if let Some(properties) = properties {
                for (key, property_schema) in properties {
                    if let Some(field) = fields.get(key) {
                        validate_at(property_schema, field, &child_path(path, key))?;
                    }
                }
            }
        }
        _ => {}
    }

    Ok(())
}
