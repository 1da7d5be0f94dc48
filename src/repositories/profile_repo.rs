use chrono::Utc;
use rusqlite::OptionalExtension;

use crate::db::DbPool;
use crate::error::{AppError, Result};
use crate::models::{FromSqliteRow, UserProfile};

#[derive(Clone)]
pub struct ProfileRepository {
    pool: DbPool,
}

impl ProfileRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_user(&self, user_id: &str) -> Result<UserProfile> {
        let pool = self.pool.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            let mut stmt = conn.prepare("SELECT * FROM profiles WHERE user_id = ?")?;
            stmt.query_row([&user_id], UserProfile::from_row)
                .optional()?
                .ok_or_else(|| {
                    AppError::NotFound(format!("Profile for user {} not found", user_id))
                })
        })
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
    }

    pub async fn upsert(&self, profile: &UserProfile) -> Result<()> {
        let pool = self.pool.clone();
        let profile = profile.clone();
        let days = serde_json::to_string(&profile.preferred_training_days)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let now = Utc::now();

        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            conn.execute(
                "INSERT INTO profiles (user_id, experience_level, units, goals, injury_flags, preferred_training_days, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(user_id) DO UPDATE SET
                    experience_level = excluded.experience_level,
                    units = excluded.units,
                    goals = excluded.goals,
                    injury_flags = excluded.injury_flags,
                    preferred_training_days = excluded.preferred_training_days,
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    profile.user_id,
                    profile.experience_level.as_str(),
                    profile.units.as_str(),
                    profile.goals,
                    profile.injury_flags,
                    days,
                    now
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
    }
}
