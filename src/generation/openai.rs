//! OpenAI-compatible chat completions client (Workers AI, OpenRouter, ...).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::client::{ModelClient, ModelRequest};
use super::error::GenerationError;
use crate::config::AiConfig;

const MAX_TOKENS: u32 = 2048;

pub struct OpenAiClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    site_url: Option<String>,
    app_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<Value>,
}

impl OpenAiClient {
    /// Returns `None` when the endpoint or key is not configured.
    pub fn from_config(config: &AiConfig) -> Result<Option<Self>, GenerationError> {
        let (Some(api_key), Some(base_url)) = (config.api_key.clone(), config.base_url.clone())
        else {
            return Ok(None);
        };

        let http = Client::builder().timeout(config.timeout).build()?;

        Ok(Some(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            site_url: config.site_url.clone(),
            app_name: config.app_name.clone(),
        }))
    }

    fn build_request_body(&self, request: &ModelRequest) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_prompt },
            ],
            "temperature": request.temperature,
            "max_tokens": MAX_TOKENS,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema_name,
                    "schema": request.schema,
                    "strict": true,
                },
            },
        })
    }
}

/// Structured outputs may already hand back a JSON object instead of text.
fn content_text(content: Value) -> Option<String> {
    match content {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn invoke(&self, request: &ModelRequest) -> Result<String, GenerationError> {
        debug!(model = %self.model, schema = %request.schema_name, "invoke: called");
        let url = format!("{}/chat/completions", self.base_url);

        let mut builder = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&self.build_request_body(request));
        if let Some(site_url) = &self.site_url {
            builder = builder.header("HTTP-Referer", site_url);
        }
        if let Some(app_name) = &self.app_name {
            builder = builder.header("X-Title", app_name);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            debug!(%status, "invoke: API error");
            return Err(GenerationError::transport(format!(
                "model endpoint returned {}: {}",
                status, text
            )));
        }

        let body: ChatResponse = response.json().await?;
        debug!(choices = body.choices.len(), "invoke: response received");

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .and_then(content_text)
            .ok_or_else(|| GenerationError::malformed("no content in model response"))
    }
}
