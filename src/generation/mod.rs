//! Structured session generation
//!
//! Profile and constraints go in, a validated [`SessionPlan`] comes out:
//! prompt, model call with retries, shape normalization, strict validation.

use std::sync::Arc;

use tracing::{debug, info, warn};

pub mod client;
pub mod error;
pub mod normalizer;
mod offline;
mod openai;
pub mod prompt;
pub mod request;
pub mod scripted;
pub mod validator;

pub use client::{GenerationClient, ModelClient, ModelRequest, RetryPolicy};
pub use error::{
    GenerationError, GenerationErrorKind, NormalizationError, SchemaViolation, Violation,
    ViolationCode,
};
pub use offline::OfflineModelClient;
pub use openai::OpenAiClient;
pub use prompt::{Prompt, PromptBuilder};
pub use request::{Constraints, GenerationRequest, ValidationError};
pub use scripted::ScriptedModelClient;

use crate::config::AiConfig;
use crate::models::{ExercisePrescription, Modality, SessionPlan, UserProfile};

pub const SCHEMA_NAME: &str = "session_plan";

/// Picks the real endpoint when credentials exist, the offline stub otherwise.
pub fn create_model_client(config: &AiConfig) -> Result<Arc<dyn ModelClient>, GenerationError> {
    match OpenAiClient::from_config(config)? {
        Some(client) => {
            info!(model = %config.model, "create_model_client: using remote model");
            Ok(Arc::new(client))
        }
        None => {
            warn!("create_model_client: AI credentials not configured, using offline plan");
            Ok(Arc::new(OfflineModelClient))
        }
    }
}

pub struct SessionGenerator {
    client: GenerationClient,
    temperature: f32,
}

impl SessionGenerator {
    pub fn new(model: Arc<dyn ModelClient>, policy: RetryPolicy, temperature: f32) -> Self {
        Self {
            client: GenerationClient::new(model, policy),
            temperature,
        }
    }

    pub fn from_config(model: Arc<dyn ModelClient>, config: &AiConfig) -> Self {
        Self::new(
            model,
            RetryPolicy::exponential(config.max_retries),
            config.temperature,
        )
    }

    /// Full pipeline for one session. Input is rejected before any model call.
    pub async fn generate(
        &self,
        profile: &UserProfile,
        request: &GenerationRequest,
    ) -> Result<SessionPlan, GenerationRequestError> {
        request.validate()?;
        debug!(
            modality = request.modality.as_str(),
            focus = ?request.effective_focus(),
            length = request.session_length_min,
            "generate: called"
        );

        let prompt = PromptBuilder::build(profile, request);
        let model_request = ModelRequest {
            system_prompt: prompt.system,
            user_prompt: prompt.user,
            temperature: self.temperature,
            schema_name: SCHEMA_NAME.to_string(),
            schema: validator::response_schema(),
        };

        let plan = self
            .client
            .generate_with(&model_request, |payload| {
                let envelope = normalizer::normalize(payload, SCHEMA_NAME)?;
                Ok(validator::validate(envelope)?)
            })
            .await?;

        info!(exercises = plan.exercises.len(), "generate: plan validated");
        Ok(plan)
    }

    /// One replacement exercise of `modality` avoiding every name in `exclude`.
    pub async fn generate_replacement(
        &self,
        profile: &UserProfile,
        modality: Modality,
        exclude: Vec<String>,
    ) -> Result<ExercisePrescription, GenerationError> {
        let request = GenerationRequest::replacement(modality, exclude);
        let plan = self.generate(profile, &request).await.map_err(|e| match e {
            GenerationRequestError::Invalid(e) => GenerationError::malformed(e.0),
            GenerationRequestError::Generation(e) => e,
        })?;

        let replacement = plan
            .exercises
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::malformed("replacement plan is empty"))?;

        if replacement.modality() != modality {
            return Err(GenerationError::malformed(format!(
                "replacement has type {} but {} was requested",
                replacement.modality().as_str(),
                modality.as_str()
            )));
        }

        Ok(replacement)
    }
}

/// Either the caller's request was invalid or the pipeline failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationRequestError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}
