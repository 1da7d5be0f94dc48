use std::env;
use std::time::Duration;

const DEFAULT_MODEL: &str = "@cf/meta/llama-4-scout-17b-16e-instruct";

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub ai: AiConfig,
}

/// Settings for the OpenAI-compatible model endpoint.
#[derive(Clone)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_retries: u32,
    pub timeout: Duration,
    pub site_url: Option<String>,
    pub app_name: Option<String>,
}

impl AiConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: non_empty_var("AI_API_KEY"),
            base_url: non_empty_var("AI_BASE_URL"),
            model: env::var("AI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            temperature: parse_var("AI_TEMPERATURE", 0.7),
            max_retries: parse_var("AI_MAX_RETRIES", 3),
            timeout: Duration::from_millis(parse_var("AI_TIMEOUT_MS", 30_000)),
            site_url: non_empty_var("AI_SITE_URL"),
            app_name: non_empty_var("AI_APP_NAME"),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_retries: 3,
            timeout: Duration::from_millis(30_000),
            site_url: None,
            app_name: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:liftcoach.db?mode=rwc".to_string()),
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("PORT", 3000),
            ai: AiConfig::from_env(),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
