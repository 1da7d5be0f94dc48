use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::generation::{
    GenerationError, GenerationErrorKind, GenerationRequestError, ValidationError, Violation,
};
use crate::runner::RunnerError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    violations: Vec<Violation>,
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::Pool(_) | AppError::Persistence(_) => "persistence",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::Validation(_) => "validation",
            AppError::Conflict(_) => "conflict",
            AppError::Generation(e) => e.kind.as_str(),
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, message, violations) = match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                    Vec::new(),
                )
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                    Vec::new(),
                )
            }
            AppError::Persistence(msg) => {
                tracing::error!("Persistence error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to save session".to_string(),
                    Vec::new(),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, Vec::new()),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Unauthorized".to_string(),
                Vec::new(),
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg, Vec::new()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, Vec::new()),
            AppError::Generation(e) => {
                tracing::warn!(kind = %e.kind, "Generation failed: {}", e.message);
                let status = match e.kind {
                    GenerationErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                    GenerationErrorKind::SchemaViolation => StatusCode::UNPROCESSABLE_ENTITY,
                    GenerationErrorKind::Malformed | GenerationErrorKind::Transport => {
                        StatusCode::BAD_GATEWAY
                    }
                };
                (status, e.message, e.violations)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                    Vec::new(),
                )
            }
        };

        let body = ErrorBody {
            error: message,
            kind,
            violations,
        };
        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.0)
    }
}

impl From<GenerationRequestError> for AppError {
    fn from(err: GenerationRequestError) -> Self {
        match err {
            GenerationRequestError::Invalid(e) => e.into(),
            GenerationRequestError::Generation(e) => e.into(),
        }
    }
}

impl From<RunnerError> for AppError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::Generation(e) => AppError::Generation(e),
            RunnerError::InvalidSet(_)
            | RunnerError::InvalidRpe(_)
            | RunnerError::InvalidFeedback(_)
            | RunnerError::ExerciseIndexOutOfRange(_)
            | RunnerError::EmptyPlan => AppError::Validation(err.to_string()),
            RunnerError::InvalidTransition(_)
            | RunnerError::InvalidPhase { .. }
            | RunnerError::SwapInFlight(_)
            | RunnerError::DuplicateExercise(_) => AppError::Conflict(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
