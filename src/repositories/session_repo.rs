use rusqlite::OptionalExtension;

use crate::db::DbPool;
use crate::error::{AppError, Result};
use crate::models::{FromSqliteRow, Session, SessionStatus};

#[derive(Clone)]
pub struct SessionRepository {
    pool: DbPool,
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| AppError::Internal(e.to_string()))
}

impl SessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, session: &Session) -> Result<()> {
        let pool = self.pool.clone();
        let exercises = to_json(&session.exercises)?;
        let logged_sets = to_json(&session.logged_sets)?;
        let completions = to_json(&session.exercise_completions)?;
        let feedback = session.feedback.as_ref().map(to_json).transpose()?;
        let s = session.clone();

        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            conn.execute(
                "INSERT INTO sessions (id, user_id, plan_id, date, modality, focus, reasons, exercises, logged_sets, exercise_completions, status, started_at, completed_at, feedback, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                rusqlite::params![
                    s.id,
                    s.user_id,
                    s.plan_id,
                    s.date,
                    s.modality.as_str(),
                    s.focus,
                    s.reasons,
                    exercises,
                    logged_sets,
                    completions,
                    s.status.as_str(),
                    s.started_at,
                    s.completed_at,
                    feedback,
                    s.created_at,
                    s.updated_at
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Session>> {
        let pool = self.pool.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            let mut stmt = conn.prepare("SELECT * FROM sessions WHERE id = ?")?;
            let result = stmt.query_row([&id], Session::from_row).optional()?;
            Ok(result)
        })
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
    }

    /// A user's sessions, newest first.
    pub async fn find_by_user(&self, user_id: &str) -> Result<Vec<Session>> {
        let pool = self.pool.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            let mut stmt = conn.prepare(
                "SELECT * FROM sessions WHERE user_id = ? ORDER BY date DESC, created_at DESC",
            )?;
            let sessions = stmt
                .query_map([&user_id], Session::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(sessions)
        })
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
    }

    pub async fn find_completed_by_user(&self, user_id: &str) -> Result<Vec<Session>> {
        let pool = self.pool.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            let mut stmt = conn.prepare(
                "SELECT * FROM sessions WHERE user_id = ? AND status = ? ORDER BY date ASC, created_at ASC",
            )?;
            let sessions = stmt
                .query_map(
                    rusqlite::params![user_id, SessionStatus::Completed.as_str()],
                    Session::from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(sessions)
        })
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
    }

    /// Writes the mutable part of a session keyed by id.
    pub async fn save(&self, session: &Session) -> Result<()> {
        let pool = self.pool.clone();
        let id = session.id.clone();
        let exercises = to_json(&session.exercises)?;
        let logged_sets = to_json(&session.logged_sets)?;
        let completions = to_json(&session.exercise_completions)?;
        let feedback = session.feedback.as_ref().map(to_json).transpose()?;
        let status = session.status.as_str();
        let started_at = session.started_at;
        let completed_at = session.completed_at;
        let updated_at = session.updated_at;

        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            let updated = conn.execute(
                "UPDATE sessions SET exercises = ?, logged_sets = ?, exercise_completions = ?, feedback = ?, status = ?, started_at = ?, completed_at = ?, updated_at = ? WHERE id = ?",
                rusqlite::params![
                    exercises,
                    logged_sets,
                    completions,
                    feedback,
                    status,
                    started_at,
                    completed_at,
                    updated_at,
                    id
                ],
            )?;
            if updated == 0 {
                return Err(AppError::NotFound(format!("Session {} not found", id)));
            }
            Ok(())
        })
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
    }
}
