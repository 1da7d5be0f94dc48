//! Session runner state machine
//!
//! Walks a session's exercises set by set, drives the rest countdown between
//! sets and records what was actually done. One runner owns one session; the
//! caller serializes access to it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod timer;

pub use timer::{
    ManualTimerService, RestTimer, RestTimerState, TimerHandle, TimerService, TokioTimerService,
};

use crate::clock::Clock;
use crate::generation::GenerationError;
use crate::models::{
    CompletionStatus, ExerciseCompletion, ExercisePrescription, LoggedSet, Modality, Session,
    SessionFeedback, SessionStatus, SessionSummary, SetActuals,
};

const MIN_EXERCISE_RPE: u8 = 6;
const MAX_EXERCISE_RPE: u8 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunnerPhase {
    NotStarted,
    #[serde(rename_all = "camelCase")]
    InExercise {
        exercise_index: usize,
        set_index: u32,
    },
    #[serde(rename_all = "camelCase")]
    RestPending {
        exercise_index: usize,
        set_index: u32,
    },
    #[serde(rename = "exercise_rpe_pending", rename_all = "camelCase")]
    ExerciseRpePending { exercise_index: usize },
    Completed {
        summary: SessionSummary,
    },
    Cancelled,
}

impl RunnerPhase {
    pub fn name(&self) -> &'static str {
        match self {
            RunnerPhase::NotStarted => "not_started",
            RunnerPhase::InExercise { .. } => "in_exercise",
            RunnerPhase::RestPending { .. } => "rest_pending",
            RunnerPhase::ExerciseRpePending { .. } => "exercise_rpe_pending",
            RunnerPhase::Completed { .. } => "completed",
            RunnerPhase::Cancelled => "cancelled",
        }
    }

    pub fn exercise_index(&self) -> Option<usize> {
        match self {
            RunnerPhase::InExercise { exercise_index, .. }
            | RunnerPhase::RestPending { exercise_index, .. }
            | RunnerPhase::ExerciseRpePending { exercise_index } => Some(*exercise_index),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunnerError {
    #[error("{0}")]
    InvalidTransition(String),

    #[error("invalid set: {0}")]
    InvalidSet(String),

    #[error("cannot {action} while {phase}")]
    InvalidPhase {
        action: &'static str,
        phase: &'static str,
    },

    #[error("exercise index {0} is out of range")]
    ExerciseIndexOutOfRange(usize),

    #[error("a swap is already in flight for exercise {0}")]
    SwapInFlight(usize),

    #[error("`{0}` is already in the session")]
    DuplicateExercise(String),

    #[error("session has no exercises")]
    EmptyPlan,

    #[error("rpe must be between 6 and 10, got {0}")]
    InvalidRpe(u8),

    #[error("invalid feedback: {0}")]
    InvalidFeedback(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Reservation for one replacement generation on an exercise slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapTicket {
    pub id: u64,
    pub exercise_index: usize,
    pub modality: Modality,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerSnapshot {
    pub session_id: String,
    pub status: SessionStatus,
    #[serde(flatten)]
    pub phase: RunnerPhase,
    pub current_exercise: Option<ExercisePrescription>,
    pub rest_timer: RestTimerState,
    pub logged_sets: usize,
}

pub struct SessionRunner {
    session: Session,
    phase: RunnerPhase,
    set_started_at: Option<DateTime<Utc>>,
    last_set_completed_at: Option<DateTime<Utc>>,
    rest_timer: RestTimer,
    clock: Arc<dyn Clock>,
    swap_in_flight: Option<(usize, u64)>,
    swaps_issued: u64,
}

impl SessionRunner {
    /// Wraps a session, picking up where an in-progress session left off.
    pub fn new(session: Session, timers: Arc<dyn TimerService>, clock: Arc<dyn Clock>) -> Self {
        let phase = match session.status {
            SessionStatus::Generated => RunnerPhase::NotStarted,
            SessionStatus::InProgress => resume_phase(&session),
            SessionStatus::Completed => RunnerPhase::Completed {
                summary: SessionSummary::from_session(
                    &session,
                    session.completed_at.unwrap_or(session.updated_at),
                ),
            },
            SessionStatus::Cancelled => RunnerPhase::Cancelled,
        };
        let set_started_at = match phase {
            RunnerPhase::InExercise { .. } => Some(clock.now()),
            _ => None,
        };

        Self {
            session,
            phase,
            set_started_at,
            last_set_completed_at: None,
            rest_timer: RestTimer::new(timers),
            clock,
            swap_in_flight: None,
            swaps_issued: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    pub fn phase(&self) -> &RunnerPhase {
        &self.phase
    }

    pub fn rest_timer(&self) -> RestTimerState {
        self.rest_timer.state()
    }

    /// Applies a rest countdown that reached zero since the last step. The
    /// next set starts when the rest ran out, not when the caller noticed.
    fn sync(&mut self) {
        let Some(rest_ended_at) = self.rest_timer.take_elapsed() else {
            return;
        };
        if let RunnerPhase::RestPending {
            exercise_index,
            set_index,
        } = self.phase
        {
            debug!(exercise_index, set_index, "runner: rest elapsed");
            self.phase = RunnerPhase::InExercise {
                exercise_index,
                set_index,
            };
            self.set_started_at = Some(rest_ended_at);
        }
    }

    /// Resets progress and enters the first exercise. Safe to call again.
    pub fn init(&mut self) -> Result<(), RunnerError> {
        if self.session.status.is_terminal() {
            return Err(RunnerError::InvalidTransition(format!(
                "cannot restart a {} session",
                self.session.status.as_str()
            )));
        }
        if self.session.exercises.is_empty() {
            return Err(RunnerError::EmptyPlan);
        }

        let now = self.clock.now();
        self.rest_timer.stop();
        self.session.logged_sets.clear();
        self.session.exercise_completions.clear();
        self.session
            .transition(SessionStatus::InProgress, now)
            .map_err(RunnerError::InvalidTransition)?;

        self.phase = RunnerPhase::InExercise {
            exercise_index: 0,
            set_index: 0,
        };
        self.set_started_at = Some(now);
        self.last_set_completed_at = None;
        self.swap_in_flight = None;

        info!(session_id = %self.session.id, "runner: started");
        Ok(())
    }

    /// Current exercise and set position for set-level actions. Recording a
    /// set during rest ends the rest.
    fn set_position(&self, action: &'static str) -> Result<(usize, u32), RunnerError> {
        match self.phase {
            RunnerPhase::InExercise {
                exercise_index,
                set_index,
            }
            | RunnerPhase::RestPending {
                exercise_index,
                set_index,
            } => Ok((exercise_index, set_index)),
            ref other => Err(RunnerError::InvalidPhase {
                action,
                phase: other.name(),
            }),
        }
    }

    pub fn log_set(&mut self, actuals: SetActuals) -> Result<LoggedSet, RunnerError> {
        self.sync();
        let (exercise_index, set_index) = self.set_position("log a set")?;

        let expected = self.exercise(exercise_index)?.modality();
        if actuals.modality() != expected {
            return Err(RunnerError::InvalidSet(format!(
                "expected {} actuals, got {}",
                expected.as_str(),
                actuals.modality().as_str()
            )));
        }
        actuals.check().map_err(RunnerError::InvalidSet)?;

        Ok(self.record_set(exercise_index, set_index, actuals, false))
    }

    /// Records the current set as skipped and advances like a logged set.
    pub fn skip_set(&mut self) -> Result<LoggedSet, RunnerError> {
        self.sync();
        let (exercise_index, set_index) = self.set_position("skip a set")?;
        let modality = self.exercise(exercise_index)?.modality();
        let actuals = SetActuals::skipped(modality, set_index + 1);
        Ok(self.record_set(exercise_index, set_index, actuals, true))
    }

    fn record_set(
        &mut self,
        exercise_index: usize,
        set_index: u32,
        actuals: SetActuals,
        skipped: bool,
    ) -> LoggedSet {
        let now = self.clock.now();
        // a set logged during rest ends the rest now
        let started_at = self.set_started_at.unwrap_or(now);
        let rest_taken_sec = match (set_index, self.last_set_completed_at) {
            (0, _) | (_, None) => None,
            (_, Some(previous)) => Some((started_at - previous).num_seconds().max(0) as u32),
        };

        let set = LoggedSet {
            exercise_index,
            set_number: set_index + 1,
            started_at,
            completed_at: now,
            skipped,
            rest_taken_sec,
            actuals,
        };
        self.session.logged_sets.push(set.clone());
        self.session.updated_at = now;
        self.last_set_completed_at = Some(now);
        self.set_started_at = None;

        let planned = self
            .session
            .exercises
            .get(exercise_index)
            .map(ExercisePrescription::planned_sets)
            .unwrap_or(1);
        let next = set_index + 1;

        if next >= planned {
            self.rest_timer.stop();
            self.phase = RunnerPhase::ExerciseRpePending { exercise_index };
        } else {
            let rest = self
                .session
                .exercises
                .get(exercise_index)
                .map(ExercisePrescription::rest_seconds)
                .unwrap_or(0);
            self.rest_timer.start(rest, now);
            self.phase = RunnerPhase::RestPending {
                exercise_index,
                set_index: next,
            };
        }

        debug!(
            exercise_index,
            set_number = set.set_number,
            skipped,
            phase = self.phase.name(),
            "runner: set recorded"
        );
        set
    }

    /// Ends the current rest early. Always succeeds.
    pub fn skip_rest(&mut self) -> Result<(), RunnerError> {
        self.sync();
        self.rest_timer.stop();
        if let RunnerPhase::RestPending {
            exercise_index,
            set_index,
        } = self.phase
        {
            debug!(exercise_index, set_index, "runner: rest skipped");
            self.phase = RunnerPhase::InExercise {
                exercise_index,
                set_index,
            };
            self.set_started_at = Some(self.clock.now());
        }
        Ok(())
    }

    /// Same transition the countdown fires at zero.
    pub fn on_rest_complete(&mut self) -> Result<(), RunnerError> {
        self.skip_rest()
    }

    pub fn complete_exercise(
        &mut self,
        rpe: Option<u8>,
        notes: Option<String>,
    ) -> Result<(), RunnerError> {
        if let Some(rpe) = rpe {
            if !(MIN_EXERCISE_RPE..=MAX_EXERCISE_RPE).contains(&rpe) {
                return Err(RunnerError::InvalidRpe(rpe));
            }
        }
        self.finish_exercise("complete an exercise", CompletionStatus::Completed, rpe, notes)
    }

    pub fn skip_exercise(&mut self) -> Result<(), RunnerError> {
        self.finish_exercise("skip an exercise", CompletionStatus::Skipped, None, None)
    }

    fn finish_exercise(
        &mut self,
        action: &'static str,
        status: CompletionStatus,
        rpe: Option<u8>,
        notes: Option<String>,
    ) -> Result<(), RunnerError> {
        self.sync();
        let exercise_index = self.phase.exercise_index().ok_or(RunnerError::InvalidPhase {
            action,
            phase: self.phase.name(),
        })?;
        if self
            .session
            .exercise_completions
            .iter()
            .any(|c| c.exercise_index == exercise_index)
        {
            return Err(RunnerError::InvalidTransition(format!(
                "exercise {} already finished",
                exercise_index
            )));
        }

        let now = self.clock.now();
        self.rest_timer.stop();
        self.session.exercise_completions.push(ExerciseCompletion {
            exercise_index,
            status,
            rpe,
            notes,
        });
        self.session.updated_at = now;

        let next = exercise_index + 1;
        if next >= self.session.exercises.len() {
            self.session
                .transition(SessionStatus::Completed, now)
                .map_err(RunnerError::InvalidTransition)?;
            let summary = SessionSummary::from_session(&self.session, now);
            info!(
                session_id = %self.session.id,
                total_sets = summary.total_sets,
                total_volume = summary.total_volume,
                "runner: session completed"
            );
            self.phase = RunnerPhase::Completed { summary };
            self.set_started_at = None;
        } else {
            debug!(exercise_index = next, "runner: next exercise");
            self.phase = RunnerPhase::InExercise {
                exercise_index: next,
                set_index: 0,
            };
            self.set_started_at = Some(now);
        }
        self.last_set_completed_at = None;
        Ok(())
    }

    /// Reserves an exercise slot for replacement. Only one generation may be
    /// pending at a time.
    pub fn begin_swap(&mut self, exercise_index: usize) -> Result<SwapTicket, RunnerError> {
        self.sync();
        if self.session.status.is_terminal() {
            return Err(RunnerError::InvalidPhase {
                action: "swap an exercise",
                phase: self.phase.name(),
            });
        }
        let modality = self.exercise(exercise_index)?.modality();
        if let Some((pending, _)) = self.swap_in_flight {
            return Err(RunnerError::SwapInFlight(pending));
        }
        if self
            .session
            .exercise_completions
            .iter()
            .any(|c| c.exercise_index == exercise_index)
        {
            return Err(RunnerError::InvalidTransition(format!(
                "exercise {} already finished",
                exercise_index
            )));
        }

        self.swaps_issued += 1;
        let id = self.swaps_issued;
        self.swap_in_flight = Some((exercise_index, id));
        debug!(exercise_index, id, modality = modality.as_str(), "runner: swap requested");
        Ok(SwapTicket {
            id,
            exercise_index,
            modality,
            exclude: self
                .session
                .exercises
                .iter()
                .map(|e| e.name.clone())
                .collect(),
        })
    }

    /// Applies the outcome of a replacement generation. On any failure the
    /// plan is left untouched.
    pub fn finish_swap(
        &mut self,
        ticket: SwapTicket,
        result: Result<ExercisePrescription, GenerationError>,
    ) -> Result<ExercisePrescription, RunnerError> {
        self.release_swap(&ticket);
        self.sync();
        let replacement = result.inspect_err(|e| {
            warn!(exercise_index = ticket.exercise_index, error = %e, "runner: swap failed");
        })?;

        let index = ticket.exercise_index;
        if self.session.status.is_terminal() {
            return Err(RunnerError::InvalidPhase {
                action: "swap an exercise",
                phase: self.phase.name(),
            });
        }
        if replacement.modality() != ticket.modality {
            return Err(GenerationError::malformed(format!(
                "replacement has type {} but {} was requested",
                replacement.modality().as_str(),
                ticket.modality.as_str()
            ))
            .into());
        }
        if self
            .session
            .exercises
            .iter()
            .any(|e| e.same_name(&replacement.name))
        {
            return Err(RunnerError::DuplicateExercise(replacement.name));
        }
        let slot = self
            .session
            .exercises
            .get_mut(index)
            .ok_or(RunnerError::ExerciseIndexOutOfRange(index))?;

        info!(
            exercise_index = index,
            from = %slot.name,
            to = %replacement.name,
            "runner: exercise swapped"
        );
        *slot = replacement.clone();
        self.session.updated_at = self.clock.now();

        // the new prescription may plan fewer sets than were already logged
        if let RunnerPhase::InExercise { exercise_index, .. }
        | RunnerPhase::RestPending { exercise_index, .. } = self.phase
        {
            if exercise_index == index {
                let done = self.session.sets_for(index).count() as u32;
                if done >= replacement.planned_sets() {
                    self.rest_timer.stop();
                    self.phase = RunnerPhase::ExerciseRpePending { exercise_index };
                }
            }
        }

        Ok(replacement)
    }

    /// Frees the slot reserved by `ticket` without touching the plan. A
    /// ticket that no longer owns the reservation is ignored.
    pub fn release_swap(&mut self, ticket: &SwapTicket) {
        if self.swap_in_flight == Some((ticket.exercise_index, ticket.id)) {
            self.swap_in_flight = None;
            debug!(
                exercise_index = ticket.exercise_index,
                id = ticket.id,
                "runner: swap released"
            );
        }
    }

    /// Abandons the session. Recorded sets stay on the session record.
    pub fn cancel(&mut self) -> Result<(), RunnerError> {
        if self.session.status == SessionStatus::Cancelled {
            return Ok(());
        }
        let now = self.clock.now();
        self.session
            .transition(SessionStatus::Cancelled, now)
            .map_err(RunnerError::InvalidTransition)?;

        self.rest_timer.stop();
        self.phase = RunnerPhase::Cancelled;
        self.set_started_at = None;
        self.last_set_completed_at = None;
        self.swap_in_flight = None;

        info!(session_id = %self.session.id, "runner: session cancelled");
        Ok(())
    }

    pub fn record_feedback(&mut self, feedback: SessionFeedback) -> Result<(), RunnerError> {
        if !self.session.status.is_terminal() {
            return Err(RunnerError::InvalidPhase {
                action: "record feedback",
                phase: self.phase.name(),
            });
        }
        feedback.check().map_err(RunnerError::InvalidFeedback)?;
        self.session.feedback = Some(feedback);
        self.session.updated_at = self.clock.now();
        Ok(())
    }

    pub fn summary(&self) -> SessionSummary {
        match &self.phase {
            RunnerPhase::Completed { summary } => summary.clone(),
            _ => SessionSummary::from_session(&self.session, self.clock.now()),
        }
    }

    pub fn snapshot(&mut self) -> RunnerSnapshot {
        self.sync();
        RunnerSnapshot {
            session_id: self.session.id.clone(),
            status: self.session.status,
            phase: self.phase.clone(),
            current_exercise: self
                .phase
                .exercise_index()
                .and_then(|i| self.session.exercises.get(i).cloned()),
            rest_timer: self.rest_timer.state(),
            logged_sets: self.session.logged_sets.len(),
        }
    }

    fn exercise(&self, index: usize) -> Result<&ExercisePrescription, RunnerError> {
        self.session
            .exercises
            .get(index)
            .ok_or(RunnerError::ExerciseIndexOutOfRange(index))
    }
}

/// Position of an in-progress session rebuilt from its records.
fn resume_phase(session: &Session) -> RunnerPhase {
    let exercise_index = session.exercise_completions.len();
    let Some(exercise) = session.exercises.get(exercise_index) else {
        return RunnerPhase::NotStarted;
    };
    let set_index = session.sets_for(exercise_index).count() as u32;
    if set_index >= exercise.planned_sets() {
        RunnerPhase::ExerciseRpePending { exercise_index }
    } else {
        RunnerPhase::InExercise {
            exercise_index,
            set_index,
        }
    }
}
