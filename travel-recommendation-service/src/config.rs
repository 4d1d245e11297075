use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;
use travel_flow::{CompletionSettings, LlmProvider, RetryPolicy};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("invalid CORS origin: {0}")]
    InvalidCorsOrigin(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    #[value(name = "openai")]
    OpenAi,
    #[value(name = "openrouter")]
    OpenRouter,
}

impl From<ProviderKind> for LlmProvider {
    fn from(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::OpenAi => LlmProvider::OpenAi,
            ProviderKind::OpenRouter => LlmProvider::OpenRouter,
        }
    }
}

/// Service settings, read from flags or the environment (`.env` is loaded first)
#[derive(Debug, Clone, Parser)]
#[command(
    name = "travel-recommendation-service",
    version,
    about = "Travel place recommendations backed by an LLM"
)]
pub struct Settings {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// PostgreSQL connection string; history is kept in memory when unset
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "LLM_PROVIDER", value_enum, default_value = "openai")]
    pub provider: ProviderKind,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub openrouter_api_key: Option<String>,

    #[arg(long, env = "LLM_MODEL", default_value = "gpt-3.5-turbo-1106")]
    pub model: String,

    #[arg(long, env = "LLM_TEMPERATURE", default_value_t = 0.7)]
    pub temperature: f64,

    #[arg(long, env = "LLM_MAX_TOKENS", default_value_t = 2000)]
    pub max_tokens: u64,

    /// Provider retries after the first failed call
    #[arg(long, env = "LLM_MAX_RETRIES", default_value_t = 2)]
    pub max_retries: u32,

    /// First backoff delay; doubles on every retry
    #[arg(long, env = "LLM_RETRY_BASE_MS", default_value_t = 1000)]
    pub retry_base_ms: u64,

    /// Extra requests allowed when the model returns too few places
    #[arg(long, env = "LLM_CORRECTIVE_ROUNDS", default_value_t = 2)]
    pub corrective_rounds: u32,

    /// Comma separated list of allowed origins, `*` allows any
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,

    /// `json` or `pretty`
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    pub log_format: String,
}

impl Settings {
    /// Load `.env` (if present) and parse flags and environment
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Settings::parse()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// API key of the configured provider
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        match self.provider {
            ProviderKind::OpenAi => self
                .openai_api_key
                .as_deref()
                .ok_or(ConfigError::MissingEnv("OPENAI_API_KEY")),
            ProviderKind::OpenRouter => self
                .openrouter_api_key
                .as_deref()
                .ok_or(ConfigError::MissingEnv("OPENROUTER_API_KEY")),
        }
    }

    pub fn completion_settings(&self) -> CompletionSettings {
        CompletionSettings {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_ms),
            corrective_rounds: self.corrective_rounds,
        }
    }

    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|origin| origin.trim() == "*")
    }
}
