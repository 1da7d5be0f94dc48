//! Model invocation with retry and backoff.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::GenerationError;

/// One structured-output call to the external model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub schema_name: String,
    pub schema: Value,
}

/// Boundary to the external model endpoint. Returns the raw text content of
/// the model's answer.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn invoke(&self, request: &ModelRequest) -> Result<String, GenerationError>;
}

/// Retry budget and delay schedule consumed by [`GenerationClient`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: fn(u32) -> Duration,
}

/// `2^attempt` seconds after the given failed attempt.
pub fn exponential_backoff(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}

pub fn no_backoff(_attempt: u32) -> Duration {
    Duration::ZERO
}

impl RetryPolicy {
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: exponential_backoff,
        }
    }

    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: no_backoff,
        }
    }

    /// At least one attempt is always made.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before the attempt following `attempt`, or `None` when the
    /// budget is spent.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt < self.attempts() {
            Some((self.backoff)(attempt))
        } else {
            None
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3)
    }
}

pub struct GenerationClient {
    model: Arc<dyn ModelClient>,
    policy: RetryPolicy,
}

impl GenerationClient {
    pub fn new(model: Arc<dyn ModelClient>, policy: RetryPolicy) -> Self {
        Self { model, policy }
    }

    /// Calls the model until a parseable JSON payload comes back.
    pub async fn generate(&self, request: &ModelRequest) -> Result<Value, GenerationError> {
        self.generate_with(request, Ok).await
    }

    /// Like [`generate`](Self::generate) but also runs `accept` on each parsed
    /// payload. Retryable errors from `accept` consume an attempt; a schema
    /// violation ends the loop at once.
    pub async fn generate_with<T, F>(
        &self,
        request: &ModelRequest,
        mut accept: F,
    ) -> Result<T, GenerationError>
    where
        F: FnMut(Value) -> Result<T, GenerationError> + Send,
    {
        let attempts = self.policy.attempts();
        debug!(attempts, schema = %request.schema_name, "generate: called");

        let mut attempt = 1;
        loop {
            let result = match self.model.invoke(request).await {
                Ok(text) => parse_payload(&text).and_then(&mut accept),
                Err(e) => Err(e),
            };

            let err = match result {
                Ok(value) => {
                    debug!(attempt, "generate: success");
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !err.kind.is_retryable() {
                debug!(attempt, kind = %err.kind, "generate: terminal error");
                return Err(err);
            }

            match self.policy.delay_after(attempt) {
                Some(delay) => {
                    warn!(
                        attempt,
                        kind = %err.kind,
                        error = %err.message,
                        backoff_ms = delay.as_millis() as u64,
                        "generate: retrying after error"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                None => {
                    warn!(attempt, kind = %err.kind, "generate: retries exhausted");
                    return Err(err);
                }
            }
        }
    }
}

/// Parses model text as JSON, tolerating a surrounding Markdown code fence.
pub fn parse_payload(text: &str) -> Result<Value, GenerationError> {
    let body = strip_code_fence(text);
    if body.is_empty() {
        return Err(GenerationError::malformed("empty model response"));
    }
    serde_json::from_str(body)
        .map_err(|e| GenerationError::malformed(format!("response is not valid JSON: {}", e)))
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string, e.g. ```json
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
