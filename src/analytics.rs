//! Progress analytics over a user's session history.
//!
//! Everything here is a pure function of the sessions passed in and the
//! reference day.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::models::{Modality, Session, SetActuals};

const ADHERENCE_TARGET_PER_WEEK: f64 = 3.0;
const DEFAULT_EXERCISE_RPE: f64 = 7.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cadence {
    #[serde(rename = "7d")]
    pub last_7_days: usize,
    #[serde(rename = "28d")]
    pub last_28_days: usize,
    #[serde(rename = "90d")]
    pub last_90_days: usize,
    pub adherence: f64,
    pub streak: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyVolume {
    pub week_start: NaiveDate,
    pub total_volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrengthEstimate {
    pub exercise_id: String,
    #[serde(rename = "est1RM")]
    pub est_1rm: f64,
    pub recorded_at: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub session_cadence: Cadence,
    pub volume_load: Vec<WeeklyVolume>,
    pub strength_progression: Vec<StrengthEstimate>,
}

/// Load change suggested for the next session of the same kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NextSessionAdjustment {
    pub adjustment: f64,
    pub rule: &'static str,
}

pub fn analyze(sessions: &[Session], today: NaiveDate) -> AnalyticsReport {
    let dates: Vec<NaiveDate> = sessions.iter().map(|s| s.date).collect();
    let cadence = cadence(&dates, today);

    AnalyticsReport {
        session_cadence: cadence,
        volume_load: weekly_volume(sessions),
        strength_progression: strength_progression(sessions),
    }
}

/// Session counts for the trailing 7/28/90 days, adherence and streak.
pub fn cadence(dates: &[NaiveDate], today: NaiveDate) -> Cadence {
    let within = |max_age: i64| {
        dates
            .iter()
            .filter(|date| (today - **date).num_days() <= max_age)
            .count()
    };
    let last_7_days = within(6);

    Cadence {
        last_7_days,
        last_28_days: within(27),
        last_90_days: within(89),
        adherence: adherence(dates.len(), last_7_days),
        streak: streak(dates, today),
    }
}

pub fn adherence(total_sessions: usize, last_7_days: usize) -> f64 {
    if total_sessions == 0 {
        return 0.0;
    }
    (last_7_days as f64 / ADHERENCE_TARGET_PER_WEEK).min(1.0)
}

/// Consecutive training days counting back from `today`. Several sessions
/// on one day each count; future dates are ignored.
pub fn streak(dates: &[NaiveDate], today: NaiveDate) -> usize {
    let mut sorted = dates.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));

    let mut streak = 0;
    let mut cursor = today;
    for date in sorted {
        match (cursor - date).num_days() {
            0 | 1 => {
                streak += 1;
                cursor = date;
            }
            gap if gap > 1 => break,
            _ => {}
        }
    }
    streak
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

pub fn weekly_volume(sessions: &[Session]) -> Vec<WeeklyVolume> {
    let mut per_week: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for session in sessions {
        let volume: f64 = session.logged_sets.iter().map(|s| s.volume()).sum();
        *per_week.entry(week_start(session.date)).or_default() += volume;
    }
    per_week
        .into_iter()
        .map(|(week_start, total_volume)| WeeklyVolume {
            week_start,
            total_volume,
        })
        .collect()
}

/// Epley estimate; a single rep is the load itself.
pub fn estimate_one_rep_max(load_kg: f64, reps: i32) -> f64 {
    if reps <= 1 {
        return load_kg;
    }
    (load_kg * (1.0 + reps as f64 / 30.0)).round()
}

/// Latest 1RM estimate per exercise, taken from the most recent set logged.
pub fn strength_progression(sessions: &[Session]) -> Vec<StrengthEstimate> {
    let mut ordered: Vec<&Session> = sessions.iter().collect();
    ordered.sort_by_key(|s| (s.date, s.created_at));

    let mut latest: BTreeMap<String, (f64, NaiveDate)> = BTreeMap::new();
    for session in ordered {
        for (name, set) in session.working_strength_sets() {
            if let SetActuals::Strength { reps, load_kg } = set.actuals {
                latest.insert(
                    name.to_string(),
                    (estimate_one_rep_max(load_kg, reps), session.date),
                );
            }
        }
    }

    latest
        .into_iter()
        .map(|(exercise_id, (est_1rm, recorded_at))| StrengthEstimate {
            exercise_id,
            est_1rm,
            recorded_at,
        })
        .collect()
}

/// Strength sessions move load by the mean exercise RPE: -5% at 9 or above,
/// +3% at 6 or below. Missing RPE counts as 7.
pub fn next_session_adjustment(session: &Session) -> NextSessionAdjustment {
    if session.modality != Modality::Strength {
        return NextSessionAdjustment {
            adjustment: 0.0,
            rule: "default",
        };
    }

    let rpes: Vec<f64> = session
        .exercise_completions
        .iter()
        .map(|c| c.rpe.map(f64::from).unwrap_or(DEFAULT_EXERCISE_RPE))
        .collect();
    let mean = if rpes.is_empty() {
        DEFAULT_EXERCISE_RPE
    } else {
        rpes.iter().sum::<f64>() / rpes.len() as f64
    };

    let adjustment = if mean >= 9.0 {
        -0.05
    } else if mean <= 6.0 {
        0.03
    } else {
        0.0
    };
    NextSessionAdjustment {
        adjustment,
        rule: "strength-rpe",
    }
}
