use axum::{extract::State, Json};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::middleware::UserId;
use crate::models::{ExperienceLevel, Units, UserProfile};
use crate::repositories::ProfileRepository;

const MAX_GOALS_LEN: usize = 500;

#[derive(Clone)]
pub struct ProfileState {
    pub profile_repo: ProfileRepository,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileForm {
    pub experience_level: ExperienceLevel,
    #[serde(default)]
    pub units: Units,
    #[serde(default)]
    pub goals: String,
    pub injury_flags: Option<String>,
    #[serde(default)]
    pub preferred_training_days: Vec<String>,
}

pub async fn show(
    State(state): State<ProfileState>,
    user_id: UserId,
) -> Result<Json<UserProfile>> {
    let profile = state.profile_repo.find_by_user(user_id.as_str()).await?;
    Ok(Json(profile))
}

pub async fn update(
    State(state): State<ProfileState>,
    user_id: UserId,
    Json(form): Json<ProfileForm>,
) -> Result<Json<UserProfile>> {
    let goals = form.goals.trim().to_string();
    if goals.chars().count() > MAX_GOALS_LEN {
        return Err(AppError::Validation(format!(
            "goals must be at most {} characters",
            MAX_GOALS_LEN
        )));
    }

    let profile = UserProfile {
        user_id: user_id.0,
        experience_level: form.experience_level,
        units: form.units,
        goals,
        injury_flags: form
            .injury_flags
            .map(|flags| flags.trim().to_string())
            .filter(|flags| !flags.is_empty()),
        preferred_training_days: form.preferred_training_days,
    };
    state.profile_repo.upsert(&profile).await?;

    tracing::debug!(user_id = %profile.user_id, "profile saved");
    Ok(Json(profile))
}
