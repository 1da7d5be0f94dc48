//! Strict structural contract for generated session plans.
//!
//! A single invalid exercise fails the whole plan: indices are referenced by
//! logged sets, so records are never dropped to make a plan pass.

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::error::{SchemaViolation, Violation, ViolationCode};
use super::normalizer::PlanEnvelope;
use crate::models::{
    CrossfitFormat, ExercisePrescription, Intensity, Modality, Section, SessionPlan,
};

pub const MAX_NAME_LEN: usize = 80;
pub const MAX_REASONS_LEN: usize = 500;
pub const MAX_TEMPO_LEN: usize = 20;
pub const MAX_LABEL_LEN: usize = 40;
pub const MAX_COMPONENT_LEN: usize = 80;

const MAX_RIR: i64 = 5;
const MAX_PAIN_CEILING: i64 = 3;

const COMMON_FIELDS: &[&str] = &["type", "name", "section"];
const STRENGTH_FIELDS: &[&str] = &["sets", "reps", "loadKg", "rir", "restSec"];
const CARDIO_FIELDS: &[&str] = &["durationMin", "intensity", "distanceKm"];
const HIIT_FIELDS: &[&str] = &["rounds", "workSec", "restSec", "modality"];
const CROSSFIT_FIELDS: &[&str] = &["format", "durationMin", "components"];
const REHAB_FIELDS: &[&str] = &["sets", "reps", "painCeiling", "tempo"];

fn fields_for(modality: Modality) -> &'static [&'static str] {
    match modality {
        Modality::Strength => STRENGTH_FIELDS,
        Modality::Cardio => CARDIO_FIELDS,
        Modality::Hiit => HIIT_FIELDS,
        Modality::Crossfit => CROSSFIT_FIELDS,
        Modality::Rehab => REHAB_FIELDS,
    }
}

fn is_known_field(key: &str) -> bool {
    COMMON_FIELDS.contains(&key) || Modality::ALL.iter().any(|m| fields_for(*m).contains(&key))
}

/// Validates the envelope, with one truncation repair pass when the only
/// problems are over-length text fields.
pub fn validate(envelope: PlanEnvelope) -> Result<SessionPlan, SchemaViolation> {
    let violations = check(&envelope);
    if violations.is_empty() {
        return into_plan(envelope);
    }

    let repairable = violations.iter().all(|v| v.code == ViolationCode::TooLong);
    if !repairable {
        debug!(count = violations.len(), "validate: plan rejected");
        return Err(SchemaViolation { violations });
    }

    warn!(
        count = violations.len(),
        "validate: over-length text fields, attempting truncation repair"
    );
    let repaired = truncate_text_fields(envelope);
    let violations = check(&repaired);
    if violations.is_empty() {
        into_plan(repaired)
    } else {
        Err(SchemaViolation { violations })
    }
}

/// Collects every violation in the envelope.
pub fn check(envelope: &PlanEnvelope) -> Vec<Violation> {
    let mut out = Vec::new();

    match &envelope.reasons {
        Value::Null => {}
        Value::String(text) => check_len(text, "reasons", MAX_REASONS_LEN, &mut out),
        _ => out.push(Violation::new(
            "reasons",
            ViolationCode::WrongType,
            "must be a string or null",
        )),
    }

    if envelope.exercises.is_empty() {
        out.push(Violation::new(
            "exercises",
            ViolationCode::EmptyPlan,
            "plan must contain at least one exercise",
        ));
    }

    for (index, exercise) in envelope.exercises.iter().enumerate() {
        let path = format!("exercises[{}]", index);
        match exercise {
            Value::Object(map) => check_exercise(map, &path, &mut out),
            _ => out.push(Violation::new(
                path,
                ViolationCode::WrongType,
                "exercise must be an object",
            )),
        }
    }

    out
}

fn check_exercise(map: &Map<String, Value>, path: &str, out: &mut Vec<Violation>) {
    let modality = match map.get("type") {
        None | Some(Value::Null) => {
            out.push(Violation::new(
                format!("{}.type", path),
                ViolationCode::MissingField,
                "type is required",
            ));
            None
        }
        Some(Value::String(s)) => {
            let parsed = Modality::parse(s);
            if parsed.is_none() {
                out.push(Violation::new(
                    format!("{}.type", path),
                    ViolationCode::InvalidEnum,
                    format!("unknown type `{}`", s),
                ));
            }
            parsed
        }
        Some(_) => {
            out.push(Violation::new(
                format!("{}.type", path),
                ViolationCode::WrongType,
                "type must be a string",
            ));
            None
        }
    };

    match map.get("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => {
            check_len(name, &format!("{}.name", path), MAX_NAME_LEN, out)
        }
        Some(Value::String(_)) => out.push(Violation::new(
            format!("{}.name", path),
            ViolationCode::OutOfRange,
            "name must not be empty",
        )),
        None | Some(Value::Null) => out.push(Violation::new(
            format!("{}.name", path),
            ViolationCode::MissingField,
            "name is required",
        )),
        Some(_) => out.push(Violation::new(
            format!("{}.name", path),
            ViolationCode::WrongType,
            "name must be a string",
        )),
    }

    let sections: Vec<&str> = Section::ALL.iter().map(Section::as_str).collect();
    match map.get("section") {
        None | Some(Value::Null) => out.push(Violation::new(
            format!("{}.section", path),
            ViolationCode::MissingField,
            "section is required",
        )),
        Some(value) => check_enum(value, &format!("{}.section", path), &sections, out),
    }

    let Some(modality) = modality else {
        return;
    };
    let own = fields_for(modality);

    for (key, value) in map {
        if COMMON_FIELDS.contains(&key.as_str()) || own.contains(&key.as_str()) || value.is_null()
        {
            continue;
        }
        let message = if is_known_field(key) {
            format!("`{}` does not apply to {} exercises", key, modality.as_str())
        } else {
            format!("unknown field `{}`", key)
        };
        out.push(Violation::new(
            format!("{}.{}", path, key),
            ViolationCode::UnexpectedField,
            message,
        ));
    }

    let field = |key: &str| map.get(key).filter(|v| !v.is_null());
    let at = |key: &str| format!("{}.{}", path, key);

    match modality {
        Modality::Strength => {
            if let Some(v) = field("sets") {
                check_int(v, &at("sets"), 1, None, out);
            }
            if let Some(v) = field("reps") {
                check_reps(v, &at("reps"), out);
            }
            if let Some(v) = field("loadKg") {
                check_number(v, &at("loadKg"), 0.0, false, out);
            }
            if let Some(v) = field("rir") {
                check_int(v, &at("rir"), 0, Some(MAX_RIR), out);
            }
            if let Some(v) = field("restSec") {
                check_int(v, &at("restSec"), 1, None, out);
            }
        }
        Modality::Cardio => {
            let duration = field("durationMin");
            let distance = field("distanceKm");
            if let Some(v) = duration {
                check_number(v, &at("durationMin"), 0.0, true, out);
            }
            if let Some(v) = distance {
                check_number(v, &at("distanceKm"), 0.0, false, out);
            }
            if let Some(v) = field("intensity") {
                let allowed: Vec<&str> = Intensity::ALL.iter().map(Intensity::as_str).collect();
                check_enum(v, &at("intensity"), &allowed, out);
            }
            if duration.is_none() && distance.is_none() {
                out.push(Violation::new(
                    path,
                    ViolationCode::MissingExtent,
                    "cardio requires durationMin or distanceKm",
                ));
            }
        }
        Modality::Hiit => {
            if let Some(v) = field("rounds") {
                check_int(v, &at("rounds"), 1, None, out);
            }
            if let Some(v) = field("workSec") {
                check_int(v, &at("workSec"), 1, None, out);
            }
            if let Some(v) = field("restSec") {
                check_int(v, &at("restSec"), 1, None, out);
            }
            if let Some(v) = field("modality") {
                check_text(v, &at("modality"), MAX_LABEL_LEN, out);
            }
        }
        Modality::Crossfit => {
            if let Some(v) = field("format") {
                let allowed: Vec<&str> = CrossfitFormat::ALL
                    .iter()
                    .map(CrossfitFormat::as_str)
                    .collect();
                check_enum(v, &at("format"), &allowed, out);
            }
            if let Some(v) = field("durationMin") {
                check_number(v, &at("durationMin"), 0.0, true, out);
            }
            if let Some(v) = field("components") {
                match v {
                    Value::Array(items) => {
                        for (i, item) in items.iter().enumerate() {
                            check_text(
                                item,
                                &format!("{}.components[{}]", path, i),
                                MAX_COMPONENT_LEN,
                                out,
                            );
                        }
                    }
                    _ => out.push(Violation::new(
                        at("components"),
                        ViolationCode::WrongType,
                        "components must be a list of strings",
                    )),
                }
            }
        }
        Modality::Rehab => {
            if let Some(v) = field("sets") {
                check_int(v, &at("sets"), 1, None, out);
            }
            if let Some(v) = field("reps") {
                check_int(v, &at("reps"), 1, None, out);
            }
            if let Some(v) = field("painCeiling") {
                check_int(v, &at("painCeiling"), 0, Some(MAX_PAIN_CEILING), out);
            }
            if let Some(v) = field("tempo") {
                check_text(v, &at("tempo"), MAX_TEMPO_LEN, out);
            }
        }
    }
}

fn check_len(text: &str, path: &str, max: usize, out: &mut Vec<Violation>) {
    let len = text.chars().count();
    if len > max {
        out.push(Violation::new(
            path,
            ViolationCode::TooLong,
            format!("{} characters exceeds the maximum of {}", len, max),
        ));
    }
}

fn check_text(value: &Value, path: &str, max: usize, out: &mut Vec<Violation>) {
    match value {
        Value::String(text) => check_len(text, path, max, out),
        _ => out.push(Violation::new(
            path,
            ViolationCode::WrongType,
            "must be a string",
        )),
    }
}

fn check_enum(value: &Value, path: &str, allowed: &[&str], out: &mut Vec<Violation>) {
    match value {
        Value::String(s) if allowed.contains(&s.as_str()) => {}
        Value::String(s) => out.push(Violation::new(
            path,
            ViolationCode::InvalidEnum,
            format!("`{}` is not one of: {}", s, allowed.join(", ")),
        )),
        _ => out.push(Violation::new(
            path,
            ViolationCode::WrongType,
            "must be a string",
        )),
    }
}

fn check_int(value: &Value, path: &str, min: i64, max: Option<i64>, out: &mut Vec<Violation>) {
    let Some(n) = value.as_i64() else {
        out.push(Violation::new(
            path,
            ViolationCode::WrongType,
            "must be an integer",
        ));
        return;
    };
    let max = max.unwrap_or(u32::MAX as i64);
    if n < min || n > max {
        out.push(Violation::new(
            path,
            ViolationCode::OutOfRange,
            format!("{} is outside {}..={}", n, min, max),
        ));
    }
}

fn check_number(value: &Value, path: &str, min: f64, exclusive: bool, out: &mut Vec<Violation>) {
    let Some(n) = value.as_f64() else {
        out.push(Violation::new(
            path,
            ViolationCode::WrongType,
            "must be a number",
        ));
        return;
    };
    let below = if exclusive { n <= min } else { n < min };
    if below {
        let bound = if exclusive { "greater than" } else { "at least" };
        out.push(Violation::new(
            path,
            ViolationCode::OutOfRange,
            format!("{} must be {} {}", n, bound, min),
        ));
    }
}

fn check_reps(value: &Value, path: &str, out: &mut Vec<Violation>) {
    match value {
        Value::Array(items) if items.len() == 2 => {
            let before = out.len();
            check_int(&items[0], &format!("{}[0]", path), 1, None, out);
            check_int(&items[1], &format!("{}[1]", path), 1, None, out);
            if out.len() == before {
                let (low, high) = (items[0].as_i64(), items[1].as_i64());
                if low > high {
                    out.push(Violation::new(
                        path,
                        ViolationCode::OutOfRange,
                        "rep range low bound exceeds high bound",
                    ));
                }
            }
        }
        Value::Array(_) => out.push(Violation::new(
            path,
            ViolationCode::WrongType,
            "rep range must be [low, high]",
        )),
        _ => check_int(value, path, 1, None, out),
    }
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn truncate_in_place(map: &mut Map<String, Value>, key: &str, max: usize) {
    if let Some(Value::String(text)) = map.get_mut(key) {
        if text.chars().count() > max {
            *text = truncate(text, max);
        }
    }
}

fn truncate_text_fields(mut envelope: PlanEnvelope) -> PlanEnvelope {
    if let Value::String(text) = &envelope.reasons {
        if text.chars().count() > MAX_REASONS_LEN {
            envelope.reasons = Value::String(truncate(text, MAX_REASONS_LEN));
        }
    }
    for exercise in envelope.exercises.iter_mut() {
        if let Value::Object(map) = exercise {
            truncate_in_place(map, "name", MAX_NAME_LEN);
            truncate_in_place(map, "tempo", MAX_TEMPO_LEN);
            truncate_in_place(map, "modality", MAX_LABEL_LEN);
            if let Some(Value::Array(components)) = map.get_mut("components") {
                for component in components.iter_mut() {
                    if let Value::String(text) = component {
                        if text.chars().count() > MAX_COMPONENT_LEN {
                            *text = truncate(text, MAX_COMPONENT_LEN);
                        }
                    }
                }
            }
        }
    }
    envelope
}

fn into_plan(envelope: PlanEnvelope) -> Result<SessionPlan, SchemaViolation> {
    let mut exercises = Vec::with_capacity(envelope.exercises.len());
    let mut violations = Vec::new();

    for (index, value) in envelope.exercises.into_iter().enumerate() {
        match serde_json::from_value::<ExercisePrescription>(value) {
            Ok(exercise) => exercises.push(exercise),
            Err(e) => violations.push(Violation::new(
                format!("exercises[{}]", index),
                ViolationCode::WrongType,
                e.to_string(),
            )),
        }
    }

    if !violations.is_empty() {
        return Err(SchemaViolation { violations });
    }

    let reasons = match envelope.reasons {
        Value::String(text) => Some(text),
        _ => None,
    };

    Ok(SessionPlan { exercises, reasons })
}

/// JSON schema sent as the structured-output `response_format`.
pub fn response_schema() -> Value {
    let nullable = |ty: &str| json!({ "type": [ty, "null"] });
    let string_enum = |values: Vec<&str>| json!({ "type": ["string", "null"], "enum": values });

    let types: Vec<&str> = Modality::ALL.iter().map(Modality::as_str).collect();
    let sections: Vec<&str> = Section::ALL.iter().map(Section::as_str).collect();

    let mut properties = Map::new();
    properties.insert(
        "type".to_string(),
        json!({ "type": "string", "enum": types }),
    );
    properties.insert(
        "name".to_string(),
        json!({ "type": "string", "maxLength": MAX_NAME_LEN }),
    );
    properties.insert(
        "section".to_string(),
        json!({ "type": "string", "enum": sections }),
    );
    properties.insert("sets".to_string(), nullable("integer"));
    properties.insert(
        "reps".to_string(),
        json!({ "anyOf": [
            { "type": "integer" },
            { "type": "array", "items": { "type": "integer" }, "minItems": 2, "maxItems": 2 },
            { "type": "null" }
        ]}),
    );
    properties.insert("loadKg".to_string(), nullable("number"));
    properties.insert("rir".to_string(), nullable("integer"));
    properties.insert("restSec".to_string(), nullable("integer"));
    properties.insert("durationMin".to_string(), nullable("number"));
    properties.insert(
        "intensity".to_string(),
        string_enum(Intensity::ALL.iter().map(Intensity::as_str).collect()),
    );
    properties.insert("distanceKm".to_string(), nullable("number"));
    properties.insert("rounds".to_string(), nullable("integer"));
    properties.insert("workSec".to_string(), nullable("integer"));
    properties.insert("modality".to_string(), nullable("string"));
    properties.insert(
        "format".to_string(),
        string_enum(CrossfitFormat::ALL.iter().map(CrossfitFormat::as_str).collect()),
    );
    properties.insert(
        "components".to_string(),
        json!({ "type": ["array", "null"], "items": { "type": "string" } }),
    );
    properties.insert("painCeiling".to_string(), nullable("integer"));
    properties.insert("tempo".to_string(), nullable("string"));

    let required: Vec<String> = properties.keys().cloned().collect();

    json!({
        "type": "object",
        "properties": {
            "exercises": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                    "additionalProperties": false
                }
            },
            "reasons": { "type": ["string", "null"], "maxLength": MAX_REASONS_LEN }
        },
        "required": ["exercises", "reasons"],
        "additionalProperties": false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Targets;

    fn envelope(exercises: Vec<Value>, reasons: Value) -> PlanEnvelope {
        PlanEnvelope { exercises, reasons }
    }

    fn strength(name: &str) -> Value {
        json!({
            "type": "strength", "name": name, "section": "working",
            "sets": 3, "reps": [8, 10], "loadKg": 60, "rir": 2, "restSec": 90,
            "durationMin": null, "intensity": null, "distanceKm": null
        })
    }

    #[test]
    fn test_valid_plan_becomes_typed() {
        let plan = validate(envelope(vec![strength("Bench Press")], json!("push day"))).unwrap();
        assert_eq!(plan.exercises.len(), 1);
        assert_eq!(plan.reasons.as_deref(), Some("push day"));
        assert!(matches!(plan.exercises[0].targets, Targets::Strength(_)));
    }

    #[test]
    fn test_cardio_without_extent_fails() {
        let cardio = json!({
            "type": "cardio", "name": "Run", "section": "working",
            "durationMin": null, "intensity": "easy", "distanceKm": null
        });
        let err = validate(envelope(vec![cardio], Value::Null)).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].code, ViolationCode::MissingExtent);
        assert_eq!(err.violations[0].path, "exercises[0]");
    }

    #[test]
    fn test_cardio_with_distance_only_passes() {
        let cardio = json!({
            "type": "cardio", "name": "5k", "section": "working",
            "durationMin": null, "intensity": "moderate", "distanceKm": 5
        });
        assert!(validate(envelope(vec![cardio], Value::Null)).is_ok());
    }

    #[test]
    fn test_one_bad_exercise_fails_whole_plan() {
        let bad = json!({
            "type": "strength", "name": "Deadlift", "section": "main",
            "sets": 3, "reps": 5, "rir": 9
        });
        let err = validate(envelope(vec![strength("Row"), bad], Value::Null)).unwrap_err();
        let paths: Vec<&str> = err.violations.iter().map(|v| v.path.as_str()).collect();
        assert!(paths.contains(&"exercises[1].section"));
        assert!(paths.contains(&"exercises[1].rir"));
    }

    #[test]
    fn test_foreign_non_null_field_is_rejected() {
        let mut exercise = strength("Squat");
        exercise["durationMin"] = json!(20);
        let err = validate(envelope(vec![exercise], Value::Null)).unwrap_err();
        assert_eq!(err.violations[0].code, ViolationCode::UnexpectedField);
    }

    #[test]
    fn test_over_long_reasons_are_truncated() {
        let reasons = "x".repeat(MAX_REASONS_LEN + 40);
        let plan = validate(envelope(vec![strength("Press")], json!(reasons))).unwrap();
        assert_eq!(plan.reasons.unwrap().chars().count(), MAX_REASONS_LEN);
    }

    #[test]
    fn test_mixed_failures_are_not_repaired() {
        let mut exercise = strength(&"n".repeat(MAX_NAME_LEN + 1));
        exercise["sets"] = json!(0);
        let err = validate(envelope(vec![exercise], Value::Null)).unwrap_err();
        let codes: Vec<ViolationCode> = err.violations.iter().map(|v| v.code).collect();
        assert!(codes.contains(&ViolationCode::TooLong));
        assert!(codes.contains(&ViolationCode::OutOfRange));
    }

    #[test]
    fn test_empty_plan_rejected() {
        let err = validate(envelope(vec![], Value::Null)).unwrap_err();
        assert_eq!(err.violations[0].code, ViolationCode::EmptyPlan);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let yoga = json!({"type": "yoga", "name": "Flow", "section": "cooldown"});
        let err = validate(envelope(vec![yoga], Value::Null)).unwrap_err();
        assert_eq!(err.violations[0].code, ViolationCode::InvalidEnum);
    }

    #[test]
    fn test_inverted_rep_range_rejected() {
        let mut exercise = strength("Curl");
        exercise["reps"] = json!([12, 8]);
        let err = validate(envelope(vec![exercise], Value::Null)).unwrap_err();
        assert_eq!(err.violations[0].path, "exercises[0].reps");
    }

    #[test]
    fn test_response_schema_requires_every_field() {
        let schema = response_schema();
        let required = schema["properties"]["exercises"]["items"]["required"]
            .as_array()
            .unwrap();
        assert!(required.iter().any(|v| v == "painCeiling"));
        assert!(required.iter().any(|v| v == "section"));
    }
}
