//! Generation pipeline error types

use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationErrorKind {
    Timeout,
    Malformed,
    Transport,
    SchemaViolation,
}

impl GenerationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationErrorKind::Timeout => "timeout",
            GenerationErrorKind::Malformed => "malformed",
            GenerationErrorKind::Transport => "transport",
            GenerationErrorKind::SchemaViolation => "schema_violation",
        }
    }

    /// Whether the client's retry policy applies to this failure.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GenerationErrorKind::SchemaViolation)
    }
}

impl fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCode {
    MissingField,
    WrongType,
    InvalidEnum,
    OutOfRange,
    TooLong,
    UnexpectedField,
    MissingExtent,
    EmptyPlan,
}

/// One entry of the structured diff returned on schema failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub path: String,
    pub code: ViolationCode,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, code: ViolationCode, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("payload does not match the session plan contract ({} violations)", .violations.len())]
pub struct SchemaViolation {
    pub violations: Vec<Violation>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizationError {
    #[error("expected a JSON object or array, got {0}")]
    UnexpectedShape(&'static str),

    #[error("missing `exercises` list")]
    MissingExercises,
}

/// Terminal failure of the generation pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("generation failed ({kind}): {message}")]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    pub message: String,
    pub violations: Vec<Violation>,
}

impl GenerationError {
    pub fn new(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            violations: Vec::new(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::Timeout, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::Malformed, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::Transport, message)
    }
}

impl From<NormalizationError> for GenerationError {
    fn from(err: NormalizationError) -> Self {
        GenerationError::malformed(err.to_string())
    }
}

impl From<SchemaViolation> for GenerationError {
    fn from(err: SchemaViolation) -> Self {
        Self {
            kind: GenerationErrorKind::SchemaViolation,
            message: err.to_string(),
            violations: err.violations,
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerationError::timeout(err.to_string())
        } else if err.is_decode() {
            GenerationError::malformed(err.to_string())
        } else {
            GenerationError::transport(err.to_string())
        }
    }
}
