use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use super::exercise::{ExercisePrescription, Modality, Targets};
use super::from_row::{json_column, optional_json_column, text_enum_column, FromSqliteRow};
use super::logged_set::LoggedSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Generated,
    InProgress,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Generated => "generated",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "generated" => Some(SessionStatus::Generated),
            "in_progress" => Some(SessionStatus::InProgress),
            "completed" => Some(SessionStatus::Completed),
            "cancelled" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }

    /// Forward-only lifecycle. Re-asserting `in_progress` is allowed so that
    /// restarting a runner stays idempotent.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Generated, InProgress)
                | (Generated, Cancelled)
                | (InProgress, InProgress)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Completed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseCompletion {
    pub exercise_index: usize,
    pub status: CompletionStatus,
    /// Borg scale, 6..=10.
    pub rpe: Option<u8>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    TooEasy,
    JustRight,
    TooHard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    RestDay,
    Holiday,
    Sick,
    Injury,
    Busy,
    Other,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFeedback {
    #[serde(rename = "sessionRPE")]
    pub session_rpe: Option<u8>,
    pub difficulty: Option<Difficulty>,
    pub notes: Option<String>,
    #[serde(default)]
    pub soreness: Vec<String>,
    #[serde(default)]
    pub injuries: Vec<String>,
    pub skip_reason: Option<SkipReason>,
    pub skip_notes: Option<String>,
}

impl SessionFeedback {
    pub fn check(&self) -> Result<(), String> {
        match self.session_rpe {
            Some(rpe) if !(1..=10).contains(&rpe) => {
                Err("sessionRPE must be between 1 and 10".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Derived view of a run; never read back as authoritative input.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub duration_min: u32,
    pub exercises_completed: usize,
    pub exercises_skipped: usize,
    pub total_sets: usize,
    pub total_volume: f64,
}

impl SessionSummary {
    pub fn from_session(session: &Session, until: DateTime<Utc>) -> Self {
        let duration_min = session
            .started_at
            .map(|started| {
                let seconds = (until - started).num_seconds().max(0);
                (seconds as f64 / 60.0).round() as u32
            })
            .unwrap_or(0);

        let count = |status: CompletionStatus| {
            session
                .exercise_completions
                .iter()
                .filter(|c| c.status == status)
                .count()
        };

        Self {
            duration_min,
            exercises_completed: count(CompletionStatus::Completed),
            exercises_skipped: count(CompletionStatus::Skipped),
            total_sets: session.logged_sets.iter().filter(|s| !s.skipped).count(),
            total_volume: session.logged_sets.iter().map(LoggedSet::volume).sum(),
        }
    }
}

/// Output of the generation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPlan {
    pub exercises: Vec<ExercisePrescription>,
    pub reasons: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub plan_id: Option<String>,
    pub date: NaiveDate,
    pub modality: Modality,
    pub focus: Option<String>,
    pub reasons: Option<String>,
    pub exercises: Vec<ExercisePrescription>,
    pub logged_sets: Vec<LoggedSet>,
    pub exercise_completions: Vec<ExerciseCompletion>,
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub feedback: Option<SessionFeedback>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn from_plan(
        id: String,
        user_id: &str,
        date: NaiveDate,
        modality: Modality,
        focus: Option<String>,
        plan: SessionPlan,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id: user_id.to_string(),
            plan_id: None,
            date,
            modality,
            focus,
            reasons: plan.reasons,
            exercises: plan.exercises,
            logged_sets: Vec::new(),
            exercise_completions: Vec::new(),
            status: SessionStatus::Generated,
            started_at: None,
            completed_at: None,
            feedback: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a lifecycle transition, rejecting anything backwards.
    pub fn transition(&mut self, next: SessionStatus, now: DateTime<Utc>) -> Result<(), String> {
        if !self.status.can_transition_to(next) {
            return Err(format!(
                "cannot move session from {} to {}",
                self.status.as_str(),
                next.as_str()
            ));
        }
        match next {
            SessionStatus::InProgress if self.started_at.is_none() => self.started_at = Some(now),
            SessionStatus::Completed | SessionStatus::Cancelled => self.completed_at = Some(now),
            _ => {}
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn sets_for(&self, exercise_index: usize) -> impl Iterator<Item = &LoggedSet> {
        self.logged_sets
            .iter()
            .filter(move |s| s.exercise_index == exercise_index)
    }

    /// Strength sets that count toward volume and 1RM estimates, with the exercise name.
    pub fn working_strength_sets(&self) -> impl Iterator<Item = (&str, &LoggedSet)> {
        self.logged_sets.iter().filter_map(move |set| {
            let exercise = self.exercises.get(set.exercise_index)?;
            match (&exercise.targets, set.skipped) {
                (Targets::Strength(_), false) => Some((exercise.name.as_str(), set)),
                _ => None,
            }
        })
    }
}

impl FromSqliteRow for Session {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            plan_id: row.get("plan_id")?,
            date: row.get("date")?,
            modality: text_enum_column(row, "modality", Modality::parse)?,
            focus: row.get("focus")?,
            reasons: row.get("reasons")?,
            exercises: json_column(row, "exercises")?,
            logged_sets: json_column(row, "logged_sets")?,
            exercise_completions: json_column(row, "exercise_completions")?,
            status: text_enum_column(row, "status", SessionStatus::parse)?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
            feedback: optional_json_column(row, "feedback")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}
