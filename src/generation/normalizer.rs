//! Shape correction for raw model payloads.
//!
//! The generator does not always honor the requested envelope. Everything
//! downstream sees only `{ "exercises": [...], "reasons": string | null }`.

use serde_json::Value;
use tracing::debug;

use super::error::NormalizationError;
use crate::models::Section;

/// Canonical envelope handed to the validator.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanEnvelope {
    pub exercises: Vec<Value>,
    pub reasons: Value,
}

pub fn normalize(payload: Value, schema_name: &str) -> Result<PlanEnvelope, NormalizationError> {
    let payload = unwrap_schema_key(payload, schema_name);

    match payload {
        Value::Array(items) => {
            debug!(count = items.len(), "normalize: bare array payload");
            let exercises = items
                .into_iter()
                .map(|item| with_default_section(lift_targets(item)))
                .collect();
            Ok(PlanEnvelope {
                exercises,
                reasons: Value::Null,
            })
        }
        Value::Object(mut map) => {
            let exercises = match map.remove("exercises") {
                Some(Value::Array(items)) => items.into_iter().map(lift_targets).collect(),
                _ => return Err(NormalizationError::MissingExercises),
            };
            let reasons = map.remove("reasons").unwrap_or(Value::Null);
            Ok(PlanEnvelope { exercises, reasons })
        }
        other => Err(NormalizationError::UnexpectedShape(type_name(&other))),
    }
}

/// `{ "<schema_name>": inner }` becomes `inner`.
fn unwrap_schema_key(payload: Value, schema_name: &str) -> Value {
    match payload {
        Value::Object(mut map) if map.len() == 1 && map.contains_key(schema_name) => {
            debug!(schema_name, "normalize: unwrapping schema-named envelope");
            map.remove(schema_name).unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Older generator output nests per-type fields under `targets`.
fn lift_targets(item: Value) -> Value {
    match item {
        Value::Object(mut map) => {
            if let Some(Value::Object(targets)) = map.remove("targets") {
                for (key, value) in targets {
                    map.entry(key).or_insert(value);
                }
            }
            Value::Object(map)
        }
        other => other,
    }
}

fn with_default_section(item: Value) -> Value {
    match item {
        Value::Object(mut map) => {
            let missing = map.get("section").map(Value::is_null).unwrap_or(true);
            if missing {
                map.insert(
                    "section".to_string(),
                    Value::String(Section::Working.as_str().to_string()),
                );
            }
            Value::Object(map)
        }
        other => other,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
