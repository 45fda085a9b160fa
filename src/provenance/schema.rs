//! Structural schema for persisted provenance events.
//!
//! Every bundle must carry exactly these fields with these JSON types. A
//! violation is a hard failure; values are never coerced.

use serde_json::Value;
use thiserror::Error;

/// Expected JSON type of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldType {
    String,
    Object,
}

impl FieldType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Object => value.is_object(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Object => "object",
        }
    }
}

const REQUIRED_FIELDS: &[(&str, FieldType)] = &[
    ("module", FieldType::String),
    ("event_type", FieldType::String),
    ("timestamp", FieldType::String),
    ("payload", FieldType::Object),
    ("commit_sha", FieldType::String),
    ("input_hash", FieldType::String),
    ("output_hash", FieldType::String),
    ("token", FieldType::String),
];

/// Fields that must also be non-empty
const NON_EMPTY_FIELDS: &[&str] = &["module", "event_type", "timestamp", "output_hash", "token"];

/// A provenance event failed structural validation
#[derive(Debug, Clone, PartialEq, Error)]
#[error("schema validation failed: {}", violations.join("; "))]
pub struct SchemaValidationError {
    pub violations: Vec<String>,
}

/// Names of the fields every bundle must contain.
pub fn required_fields() -> impl Iterator<Item = &'static str> {
    REQUIRED_FIELDS.iter().map(|(name, _)| *name)
}

/// Validate a serialized event against the bundle schema.
pub fn validate_event(event: &Value) -> Result<(), SchemaValidationError> {
    let Some(obj) = event.as_object() else {
        return Err(SchemaValidationError {
            violations: vec!["event: expected object".to_string()],
        });
    };

    let mut violations = Vec::new();

    for (name, ty) in REQUIRED_FIELDS {
        match obj.get(*name) {
            None => violations.push(format!("{}: required field missing", name)),
            Some(value) if !ty.matches(value) => violations.push(format!(
                "{}: expected {}, found {}",
                name,
                ty.name(),
                json_type_name(value)
            )),
            Some(Value::String(s)) if s.is_empty() && NON_EMPTY_FIELDS.contains(name) => {
                violations.push(format!("{}: must not be empty", name))
            }
            Some(_) => {}
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(SchemaValidationError { violations })
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
