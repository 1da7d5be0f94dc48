#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, Response},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use liftcoach::clock::ManualClock;
use liftcoach::db::{create_memory_pool, DbPool};
use liftcoach::generation::{
    GenerationError, ModelClient, ModelRequest, RetryPolicy, ScriptedModelClient,
    SessionGenerator,
};
use liftcoach::handlers::{analytics, profile, sessions};
use liftcoach::middleware::USER_ID_HEADER;
use liftcoach::migrations::run_migrations_for_tests;
use liftcoach::models::{ExperienceLevel, Units, UserProfile};
use liftcoach::repositories::{ProfileRepository, SessionRepository};
use liftcoach::runner::ManualTimerService;

pub const USER: &str = "athlete-1";
pub const OTHER_USER: &str = "athlete-2";

pub fn setup_test_db() -> DbPool {
    let pool = create_memory_pool().expect("Failed to create test database");
    run_migrations_for_tests(&pool).expect("Failed to run migrations");
    pool
}

/// Monday 2024-06-03 09:00 UTC.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
}

/// Model that never answers.
pub struct StalledModelClient;

#[async_trait]
impl ModelClient for StalledModelClient {
    async fn invoke(&self, _request: &ModelRequest) -> Result<String, GenerationError> {
        std::future::pending().await
    }
}

pub struct TestApp {
    pub router: Router,
    pub pool: DbPool,
    pub model: Arc<ScriptedModelClient>,
    pub timers: ManualTimerService,
    pub clock: ManualClock,
    pub session_repo: SessionRepository,
    pub runners: sessions::RunnerRegistry,
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user);
        }
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.request(Method::GET, uri, Some(USER), None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> Response<Body> {
        self.request(Method::POST, uri, Some(USER), Some(body)).await
    }

    /// Router sharing this app's database, runners and clocks but calling
    /// `model` for generation.
    pub fn router_with_model(&self, model: Arc<dyn ModelClient>) -> Router {
        build_router(
            self.pool.clone(),
            model,
            self.runners.clone(),
            &self.timers,
            &self.clock,
        )
    }

    /// Generates a session from whatever the model is scripted to return
    /// and hands back its id.
    pub async fn generate_session(&self, request: Value) -> String {
        let response = self.post("/api/sessions/generate", request).await;
        assert_eq!(response.status(), 201);
        let session = body_json(response).await;
        session["id"].as_str().unwrap().to_string()
    }
}

fn build_router(
    pool: DbPool,
    model: Arc<dyn ModelClient>,
    runners: sessions::RunnerRegistry,
    timers: &ManualTimerService,
    clock: &ManualClock,
) -> Router {
    let generator = SessionGenerator::new(model, RetryPolicy::immediate(3), 0.7);
    let session_repo = SessionRepository::new(pool.clone());
    let profile_repo = ProfileRepository::new(pool);

    let sessions_state = sessions::SessionsState {
        session_repo: session_repo.clone(),
        profile_repo: profile_repo.clone(),
        generator: Arc::new(generator),
        runners,
        timers: Arc::new(timers.clone()),
        clock: Arc::new(clock.clone()),
    };
    let analytics_state = analytics::AnalyticsState {
        session_repo,
        clock: Arc::new(clock.clone()),
    };
    let profile_state = profile::ProfileState { profile_repo };

    liftcoach::routes::create_router(sessions_state, analytics_state, profile_state)
}

pub fn create_test_app(pool: DbPool) -> TestApp {
    let model = Arc::new(ScriptedModelClient::default());
    let timers = ManualTimerService::new();
    let clock = ManualClock::new(start_time());
    let session_repo = SessionRepository::new(pool.clone());
    let runners = sessions::RunnerRegistry::new();

    let router = build_router(pool.clone(), model.clone(), runners.clone(), &timers, &clock);

    TestApp {
        router,
        pool,
        model,
        timers,
        clock,
        session_repo,
        runners,
    }
}

pub async fn create_test_profile(pool: &DbPool, user_id: &str) -> UserProfile {
    let profile = UserProfile {
        user_id: user_id.to_string(),
        experience_level: ExperienceLevel::Intermediate,
        units: Units::Metric,
        goals: "build strength".to_string(),
        injury_flags: None,
        preferred_training_days: vec!["Mon".to_string(), "Thu".to_string()],
    };
    ProfileRepository::new(pool.clone())
        .upsert(&profile)
        .await
        .unwrap();
    profile
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn strength_request() -> Value {
    json!({ "modality": "strength", "focus": "legs", "sessionLengthMin": 45 })
}

/// Two working strength exercises: 3x5 back squat and 2x10 split squat.
pub fn strength_plan() -> String {
    json!({
        "exercises": [
            {
                "type": "strength",
                "name": "Back Squat",
                "section": "working",
                "sets": 3,
                "reps": 5,
                "loadKg": 100,
                "rir": 2,
                "restSec": 120
            },
            {
                "type": "strength",
                "name": "Bulgarian Split Squat",
                "section": "working",
                "sets": 2,
                "reps": [8, 10],
                "loadKg": 20,
                "rir": 2,
                "restSec": 60
            }
        ],
        "reasons": "Squat pattern first while fresh."
    })
    .to_string()
}

pub fn replacement_plan(name: &str) -> String {
    json!({
        "exercises": [{
            "type": "strength",
            "name": name,
            "section": "working",
            "sets": 3,
            "reps": 6,
            "loadKg": 90,
            "rir": 2,
            "restSec": 120
        }],
        "reasons": null
    })
    .to_string()
}
