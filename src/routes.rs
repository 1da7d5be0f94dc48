use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{analytics, health, profile, sessions};

pub fn create_router(
    sessions_state: sessions::SessionsState,
    analytics_state: analytics::AnalyticsState,
    profile_state: profile::ProfileState,
) -> Router {
    Router::new()
        // Session generation and runner
        .route("/api/sessions/generate", post(sessions::generate))
        .route("/api/sessions/{id}", get(sessions::show))
        .route("/api/sessions/{id}/start", post(sessions::start))
        .route("/api/sessions/{id}/runner", get(sessions::snapshot))
        .route("/api/sessions/{id}/sets", post(sessions::log_set))
        .route("/api/sessions/{id}/sets/skip", post(sessions::skip_set))
        .route("/api/sessions/{id}/rest/skip", post(sessions::skip_rest))
        .route(
            "/api/sessions/{id}/exercises/complete",
            post(sessions::complete_exercise),
        )
        .route(
            "/api/sessions/{id}/exercises/skip",
            post(sessions::skip_exercise),
        )
        .route("/api/sessions/{id}/swap", post(sessions::swap))
        .route("/api/sessions/{id}/feedback", post(sessions::feedback))
        .route("/api/sessions/{id}/cancel", post(sessions::cancel))
        .with_state(sessions_state)
        // Analytics
        .route("/api/analytics", get(analytics::report))
        .with_state(analytics_state)
        // Profile
        .route("/api/profile", get(profile::show).put(profile::update))
        .with_state(profile_state)
        // Health check
        .route("/health", get(health::health_check))
}
