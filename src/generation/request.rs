use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Modality;

pub const STRENGTH_FOCUS: &[&str] = &[
    "chest",
    "back",
    "legs",
    "arms",
    "shoulders",
    "full_body",
    "push",
    "pull",
    "upper",
    "lower",
    "core",
    "glutes",
];

pub const CARDIO_FOCUS: &[&str] = &[
    "running",
    "cycling",
    "bike",
    "swimming",
    "rowing",
    "jumping_rope",
    "elliptical",
    "mixed",
];

pub const MIN_SESSION_LENGTH_MIN: u32 = 10;
pub const MAX_SESSION_LENGTH_MIN: u32 = 180;
pub const MAX_EXERCISE_COUNT: u32 = 20;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Constraints {
    pub exercise_count: Option<u32>,
    pub exclude_exercises: Vec<String>,
    pub equipment: Vec<String>,
    pub notes: Option<String>,
}

/// Generate-session request as accepted from callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub modality: Modality,
    pub focus: Option<String>,
    pub session_length_min: u32,
    pub day: Option<u32>,
    #[serde(default)]
    pub constraints: Constraints,
}

impl GenerationRequest {
    /// Request for a single replacement exercise of the given modality.
    pub fn replacement(modality: Modality, exclude: Vec<String>) -> Self {
        Self {
            modality,
            focus: None,
            session_length_min: MIN_SESSION_LENGTH_MIN,
            day: None,
            constraints: Constraints {
                exercise_count: Some(1),
                exclude_exercises: exclude,
                ..Default::default()
            },
        }
    }

    pub fn focus_vocabulary(modality: Modality) -> &'static [&'static str] {
        match modality {
            Modality::Strength => STRENGTH_FOCUS,
            Modality::Cardio => CARDIO_FOCUS,
            _ => &[],
        }
    }

    /// Rejects malformed input before any external call is made.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(MIN_SESSION_LENGTH_MIN..=MAX_SESSION_LENGTH_MIN).contains(&self.session_length_min) {
            return Err(ValidationError(format!(
                "sessionLengthMin must be between {} and {}",
                MIN_SESSION_LENGTH_MIN, MAX_SESSION_LENGTH_MIN
            )));
        }

        if let Some(count) = self.constraints.exercise_count {
            if count == 0 || count > MAX_EXERCISE_COUNT {
                return Err(ValidationError(format!(
                    "constraints.exerciseCount must be between 1 and {}",
                    MAX_EXERCISE_COUNT
                )));
            }
        }

        if let Some(day) = self.day {
            if day == 0 {
                return Err(ValidationError("day must be positive".to_string()));
            }
        }

        if let Some(focus) = self.focus.as_deref() {
            let allowed = Self::focus_vocabulary(self.modality);
            let is_na = focus.eq_ignore_ascii_case("na");
            if allowed.is_empty() && !is_na {
                return Err(ValidationError(format!(
                    "focus is not supported for {} sessions",
                    self.modality.as_str()
                )));
            }
            if !allowed.is_empty() && !allowed.contains(&focus) {
                return Err(ValidationError(format!(
                    "invalid focus `{}` for {}; expected one of: {}",
                    focus,
                    self.modality.as_str(),
                    allowed.join(", ")
                )));
            }
        }

        Ok(())
    }

    /// Focus with the "not applicable" marker folded away.
    pub fn effective_focus(&self) -> Option<&str> {
        self.focus
            .as_deref()
            .filter(|f| !f.eq_ignore_ascii_case("na"))
    }
}
