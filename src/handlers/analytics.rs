use std::sync::Arc;

use axum::{extract::State, Json};

use crate::analytics::{self, AnalyticsReport};
use crate::clock::Clock;
use crate::error::Result;
use crate::middleware::UserId;
use crate::repositories::SessionRepository;

#[derive(Clone)]
pub struct AnalyticsState {
    pub session_repo: SessionRepository,
    pub clock: Arc<dyn Clock>,
}

pub async fn report(
    State(state): State<AnalyticsState>,
    user_id: UserId,
) -> Result<Json<AnalyticsReport>> {
    let sessions = state
        .session_repo
        .find_completed_by_user(user_id.as_str())
        .await?;
    let today = state.clock.now().date_naive();

    Ok(Json(analytics::analyze(&sessions, today)))
}
