use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::analytics::{self, NextSessionAdjustment};
use crate::clock::Clock;
use crate::error::{AppError, Result};
use crate::generation::{GenerationRequest, SessionGenerator};
use crate::middleware::UserId;
use crate::models::{
    ExercisePrescription, LoggedSet, Session, SessionFeedback, SessionStatus, SetActuals,
};
use crate::repositories::{ProfileRepository, SessionRepository};
use crate::runner::{RunnerSnapshot, SessionRunner, SwapTicket, TimerService};

type SharedRunner = Arc<AsyncMutex<SessionRunner>>;

/// Live runners keyed by session id. Each runner has its own lock so one
/// slow session never blocks another.
#[derive(Clone, Default)]
pub struct RunnerRegistry {
    runners: Arc<Mutex<HashMap<String, SharedRunner>>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<String, SharedRunner>> {
        self.runners.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn get(&self, session_id: &str) -> Option<SharedRunner> {
        self.map().get(session_id).cloned()
    }

    /// Keeps whichever runner got there first.
    fn insert(&self, session_id: String, runner: SessionRunner) -> SharedRunner {
        self.map()
            .entry(session_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(runner)))
            .clone()
    }

    fn remove(&self, session_id: &str) {
        self.map().remove(session_id);
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

/// Holds a swap reservation while the model works. Dropping it without
/// [`disarm`](Self::disarm), e.g. when the request is abandoned mid-call,
/// frees the slot again.
struct SwapReservation {
    runner: SharedRunner,
    ticket: Option<SwapTicket>,
}

impl SwapReservation {
    fn new(runner: SharedRunner, ticket: SwapTicket) -> Self {
        Self {
            runner,
            ticket: Some(ticket),
        }
    }

    /// Called with the runner locked, right before the result is applied.
    fn disarm(mut self) {
        self.ticket = None;
    }
}

impl Drop for SwapReservation {
    fn drop(&mut self) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };
        warn!(exercise_index = ticket.exercise_index, "swap: request dropped, releasing slot");
        if let Ok(mut runner) = self.runner.try_lock() {
            runner.release_swap(&ticket);
            return;
        }
        let runner = self.runner.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                runner.lock().await.release_swap(&ticket);
            });
        }
    }
}

#[derive(Clone)]
pub struct SessionsState {
    pub session_repo: SessionRepository,
    pub profile_repo: ProfileRepository,
    pub generator: Arc<SessionGenerator>,
    pub runners: RunnerRegistry,
    pub timers: Arc<dyn TimerService>,
    pub clock: Arc<dyn Clock>,
}

impl SessionsState {
    /// Live runner for a session owned by `user_id`, loading it from the
    /// database when it is not in memory yet.
    async fn runner(&self, user_id: &UserId, session_id: &str) -> Result<SharedRunner> {
        if let Some(runner) = self.runners.get(session_id) {
            if runner.lock().await.session().user_id != user_id.as_str() {
                return Err(session_not_found(session_id));
            }
            return Ok(runner);
        }

        let session = self.owned_session(user_id, session_id).await?;
        debug!(session_id, status = session.status.as_str(), "runner: loaded");
        let runner = SessionRunner::new(session, self.timers.clone(), self.clock.clone());
        Ok(self.runners.insert(session_id.to_string(), runner))
    }

    async fn owned_session(&self, user_id: &UserId, session_id: &str) -> Result<Session> {
        self.session_repo
            .find_by_id(session_id)
            .await?
            .filter(|s| s.user_id == user_id.as_str())
            .ok_or_else(|| session_not_found(session_id))
    }

    /// Writes the runner's session. Finished sessions leave memory once
    /// stored; a failed write keeps the runner so the next step retries it.
    async fn persist(&self, runner: &SessionRunner) -> Result<()> {
        let session = runner.session();
        self.session_repo
            .save(session)
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))?;

        if session.status.is_terminal() {
            self.runners.remove(&session.id);
        }
        Ok(())
    }
}

fn session_not_found(session_id: &str) -> AppError {
    AppError::NotFound(format!("Session {} not found", session_id))
}

// Request bodies
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteExerciseForm {
    pub rpe: Option<u8>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapForm {
    pub exercise_index: usize,
}

// Responses
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetResponse {
    pub set: LoggedSet,
    pub runner: RunnerSnapshot,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseResponse {
    pub runner: RunnerSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_session_adjustment: Option<NextSessionAdjustment>,
}

// Handlers
pub async fn generate(
    State(state): State<SessionsState>,
    user_id: UserId,
    Json(request): Json<GenerationRequest>,
) -> Result<Response> {
    request.validate()?;
    let profile = state.profile_repo.find_by_user(user_id.as_str()).await?;
    let plan = state.generator.generate(&profile, &request).await?;

    let now = state.clock.now();
    let session = Session::from_plan(
        uuid::Uuid::new_v4().to_string(),
        user_id.as_str(),
        now.date_naive(),
        request.modality,
        request.effective_focus().map(str::to_string),
        plan,
        now,
    );
    state
        .session_repo
        .create(&session)
        .await
        .map_err(|e| AppError::Persistence(e.to_string()))?;

    info!(session_id = %session.id, exercises = session.exercises.len(), "session generated");
    Ok((StatusCode::CREATED, Json(session)).into_response())
}

pub async fn show(
    State(state): State<SessionsState>,
    user_id: UserId,
    Path(id): Path<String>,
) -> Result<Json<Session>> {
    if let Some(runner) = state.runners.get(&id) {
        let runner = runner.lock().await;
        if runner.session().user_id == user_id.as_str() {
            return Ok(Json(runner.session().clone()));
        }
        return Err(session_not_found(&id));
    }
    Ok(Json(state.owned_session(&user_id, &id).await?))
}

pub async fn start(
    State(state): State<SessionsState>,
    user_id: UserId,
    Path(id): Path<String>,
) -> Result<Json<RunnerSnapshot>> {
    let runner = state.runner(&user_id, &id).await?;
    let mut runner = runner.lock().await;
    runner.init()?;
    state.persist(&runner).await?;
    Ok(Json(runner.snapshot()))
}

pub async fn snapshot(
    State(state): State<SessionsState>,
    user_id: UserId,
    Path(id): Path<String>,
) -> Result<Json<RunnerSnapshot>> {
    let runner = state.runner(&user_id, &id).await?;
    let mut runner = runner.lock().await;
    Ok(Json(runner.snapshot()))
}

pub async fn log_set(
    State(state): State<SessionsState>,
    user_id: UserId,
    Path(id): Path<String>,
    Json(actuals): Json<SetActuals>,
) -> Result<Response> {
    let runner = state.runner(&user_id, &id).await?;
    let mut runner = runner.lock().await;
    let set = runner.log_set(actuals)?;
    state.persist(&runner).await?;

    let body = SetResponse {
        set,
        runner: runner.snapshot(),
    };
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

pub async fn skip_set(
    State(state): State<SessionsState>,
    user_id: UserId,
    Path(id): Path<String>,
) -> Result<Json<SetResponse>> {
    let runner = state.runner(&user_id, &id).await?;
    let mut runner = runner.lock().await;
    let set = runner.skip_set()?;
    state.persist(&runner).await?;

    Ok(Json(SetResponse {
        set,
        runner: runner.snapshot(),
    }))
}

pub async fn skip_rest(
    State(state): State<SessionsState>,
    user_id: UserId,
    Path(id): Path<String>,
) -> Result<Json<RunnerSnapshot>> {
    let runner = state.runner(&user_id, &id).await?;
    let mut runner = runner.lock().await;
    runner.skip_rest()?;
    Ok(Json(runner.snapshot()))
}

pub async fn complete_exercise(
    State(state): State<SessionsState>,
    user_id: UserId,
    Path(id): Path<String>,
    Json(form): Json<CompleteExerciseForm>,
) -> Result<Json<ExerciseResponse>> {
    let runner = state.runner(&user_id, &id).await?;
    let mut runner = runner.lock().await;
    runner.complete_exercise(form.rpe, form.notes)?;
    state.persist(&runner).await?;
    Ok(Json(exercise_response(&mut runner)))
}

pub async fn skip_exercise(
    State(state): State<SessionsState>,
    user_id: UserId,
    Path(id): Path<String>,
) -> Result<Json<ExerciseResponse>> {
    let runner = state.runner(&user_id, &id).await?;
    let mut runner = runner.lock().await;
    runner.skip_exercise()?;
    state.persist(&runner).await?;
    Ok(Json(exercise_response(&mut runner)))
}

fn exercise_response(runner: &mut SessionRunner) -> ExerciseResponse {
    let next_session_adjustment = (runner.session().status == SessionStatus::Completed)
        .then(|| analytics::next_session_adjustment(runner.session()));
    ExerciseResponse {
        runner: runner.snapshot(),
        next_session_adjustment,
    }
}

/// Replaces one exercise with a freshly generated one. The runner is not
/// locked while the model is working.
pub async fn swap(
    State(state): State<SessionsState>,
    user_id: UserId,
    Path(id): Path<String>,
    Json(form): Json<SwapForm>,
) -> Result<Json<ExercisePrescription>> {
    let profile = state.profile_repo.find_by_user(user_id.as_str()).await?;
    let shared = state.runner(&user_id, &id).await?;

    let ticket = shared.lock().await.begin_swap(form.exercise_index)?;
    let reservation = SwapReservation::new(shared.clone(), ticket.clone());
    let result = state
        .generator
        .generate_replacement(&profile, ticket.modality, ticket.exclude.clone())
        .await;

    let mut runner = shared.lock().await;
    reservation.disarm();
    let replacement = runner.finish_swap(ticket, result)?;
    state.persist(&runner).await?;
    Ok(Json(replacement))
}

pub async fn feedback(
    State(state): State<SessionsState>,
    user_id: UserId,
    Path(id): Path<String>,
    Json(feedback): Json<SessionFeedback>,
) -> Result<Json<Session>> {
    let runner = state.runner(&user_id, &id).await?;
    let mut runner = runner.lock().await;
    runner.record_feedback(feedback)?;
    state.persist(&runner).await?;
    Ok(Json(runner.session().clone()))
}

pub async fn cancel(
    State(state): State<SessionsState>,
    user_id: UserId,
    Path(id): Path<String>,
) -> Result<Json<RunnerSnapshot>> {
    let runner = state.runner(&user_id, &id).await?;
    let mut runner = runner.lock().await;
    runner.cancel()?;
    state.persist(&runner).await?;
    Ok(Json(runner.snapshot()))
}
