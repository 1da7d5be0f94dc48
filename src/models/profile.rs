use rusqlite::Row;
use serde::{Deserialize, Serialize};

use super::from_row::{json_column, FromSqliteRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl ExperienceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperienceLevel::Beginner => "beginner",
            ExperienceLevel::Intermediate => "intermediate",
            ExperienceLevel::Advanced => "advanced",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "intermediate" => ExperienceLevel::Intermediate,
            "advanced" => ExperienceLevel::Advanced,
            _ => ExperienceLevel::Beginner,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "imperial" => Units::Imperial,
            _ => Units::Metric,
        }
    }
}

/// The slice of a user's profile the generator needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub experience_level: ExperienceLevel,
    pub units: Units,
    pub goals: String,
    pub injury_flags: Option<String>,
    pub preferred_training_days: Vec<String>,
}

impl FromSqliteRow for UserProfile {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let experience: String = row.get("experience_level")?;
        let units: String = row.get("units")?;
        Ok(Self {
            user_id: row.get("user_id")?,
            experience_level: ExperienceLevel::parse(&experience),
            units: Units::parse(&units),
            goals: row.get("goals")?,
            injury_flags: row.get("injury_flags")?,
            preferred_training_days: json_column(row, "preferred_training_days")?,
        })
    }
}
