use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::exercise::{Intensity, Modality};

const MAX_PAIN_LEVEL: u8 = 3;

/// What the athlete actually did in one set, per modality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SetActuals {
    #[serde(rename_all = "camelCase")]
    Strength { reps: i32, load_kg: f64 },
    #[serde(rename_all = "camelCase")]
    Cardio {
        duration_min: f64,
        distance_km: Option<f64>,
        intensity: Intensity,
    },
    #[serde(rename_all = "camelCase")]
    Hiit {
        round: i32,
        work_sec: i32,
        rest_sec: i32,
    },
    #[serde(rename_all = "camelCase")]
    Rehab { reps: i32, pain_level: Option<u8> },
    #[serde(rename_all = "camelCase")]
    Crossfit {
        completed_rounds: Option<i32>,
        time_seconds: Option<i32>,
    },
}

impl SetActuals {
    pub fn modality(&self) -> Modality {
        match self {
            SetActuals::Strength { .. } => Modality::Strength,
            SetActuals::Cardio { .. } => Modality::Cardio,
            SetActuals::Hiit { .. } => Modality::Hiit,
            SetActuals::Rehab { .. } => Modality::Rehab,
            SetActuals::Crossfit { .. } => Modality::Crossfit,
        }
    }

    /// Placeholder actuals recorded for a skipped set.
    pub fn skipped(modality: Modality, set_number: u32) -> Self {
        match modality {
            Modality::Strength => SetActuals::Strength {
                reps: 0,
                load_kg: 0.0,
            },
            Modality::Cardio => SetActuals::Cardio {
                duration_min: 0.0,
                distance_km: None,
                intensity: Intensity::Easy,
            },
            Modality::Hiit => SetActuals::Hiit {
                round: set_number as i32,
                work_sec: 0,
                rest_sec: 0,
            },
            Modality::Rehab => SetActuals::Rehab {
                reps: 0,
                pain_level: None,
            },
            Modality::Crossfit => SetActuals::Crossfit {
                completed_rounds: None,
                time_seconds: None,
            },
        }
    }

    /// Rejects negative or non-finite values before they reach the runner state.
    pub fn check(&self) -> Result<(), String> {
        match self {
            SetActuals::Strength { reps, load_kg } => {
                non_negative("reps", *reps)?;
                non_negative_f64("loadKg", *load_kg)
            }
            SetActuals::Cardio {
                duration_min,
                distance_km,
                ..
            } => {
                non_negative_f64("durationMin", *duration_min)?;
                match distance_km {
                    Some(km) => non_negative_f64("distanceKm", *km),
                    None => Ok(()),
                }
            }
            SetActuals::Hiit {
                round,
                work_sec,
                rest_sec,
            } => {
                if *round < 1 {
                    return Err("round must be at least 1".to_string());
                }
                non_negative("workSec", *work_sec)?;
                non_negative("restSec", *rest_sec)
            }
            SetActuals::Rehab { reps, pain_level } => {
                non_negative("reps", *reps)?;
                match pain_level {
                    Some(level) if *level > MAX_PAIN_LEVEL => Err(format!(
                        "painLevel must be between 0 and {}",
                        MAX_PAIN_LEVEL
                    )),
                    _ => Ok(()),
                }
            }
            SetActuals::Crossfit {
                completed_rounds,
                time_seconds,
            } => {
                if let Some(rounds) = completed_rounds {
                    non_negative("completedRounds", *rounds)?;
                }
                if let Some(seconds) = time_seconds {
                    non_negative("timeSeconds", *seconds)?;
                }
                Ok(())
            }
        }
    }

    /// `reps × loadKg` for strength sets, zero otherwise.
    pub fn volume(&self) -> f64 {
        match self {
            SetActuals::Strength { reps, load_kg } => *reps as f64 * load_kg,
            _ => 0.0,
        }
    }
}

fn non_negative(field: &str, value: i32) -> Result<(), String> {
    if value < 0 {
        return Err(format!("{} must not be negative", field));
    }
    Ok(())
}

fn non_negative_f64(field: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || value < 0.0 {
        return Err(format!("{} must be a non-negative number", field));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedSet {
    pub exercise_index: usize,
    /// 1-based, strictly increasing per exercise.
    pub set_number: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub skipped: bool,
    /// Rest taken before this set; absent for the first set of an exercise.
    pub rest_taken_sec: Option<u32>,
    #[serde(flatten)]
    pub actuals: SetActuals,
}

impl LoggedSet {
    pub fn volume(&self) -> f64 {
        if self.skipped {
            0.0
        } else {
            self.actuals.volume()
        }
    }
}
