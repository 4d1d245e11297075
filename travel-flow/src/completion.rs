//! The seam between the generator and an actual LLM provider.
//!
//! [`PlaceGenerator`](crate::generator::PlaceGenerator) only ever talks to a
//! [`CompletionBackend`]; the production implementation wraps `rig` agents and
//! tests plug in scripted fakes.

use async_trait::async_trait;
use rig::agent::AgentBuilder;
use rig::client::CompletionClient;
use rig::completion::{Chat, CompletionModel};
use rig::providers::{openai, openrouter};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use crate::prompt::PromptPair;

/// A failed provider call. The generator retries every variant the same way.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),

    #[error("provider returned an empty response")]
    EmptyResponse,
}

/// One chat completion: system + user message in, raw text out
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &PromptPair) -> Result<String, ProviderError>;
}

/// Which hosted API the rig backend talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    OpenRouter,
}

/// Sampling settings applied to every call
#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u64,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo-1106".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

enum ProviderClient {
    OpenAi(openai::Client),
    OpenRouter(openrouter::Client),
}

/// [`CompletionBackend`] backed by a rig provider client.
///
/// The client is built once and owned by the backend; a fresh agent with the
/// system prompt as preamble is built for every call.
pub struct RigCompletionBackend {
    client: ProviderClient,
    settings: CompletionSettings,
}

impl RigCompletionBackend {
    pub fn new(provider: LlmProvider, api_key: &str, settings: CompletionSettings) -> Self {
        let client = match provider {
            LlmProvider::OpenAi => ProviderClient::OpenAi(openai::Client::new(api_key)),
            LlmProvider::OpenRouter => ProviderClient::OpenRouter(openrouter::Client::new(api_key)),
        };
        Self { client, settings }
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }
}

/// Extra request fields asking the provider for a bare JSON object
fn json_response_params() -> Value {
    json!({ "response_format": { "type": "json_object" } })
}

async fn chat_once<M: CompletionModel>(
    builder: AgentBuilder<M>,
    settings: &CompletionSettings,
    prompt: &PromptPair,
) -> Result<String, ProviderError> {
    let agent = builder
        .preamble(&prompt.system)
        .temperature(settings.temperature)
        .max_tokens(settings.max_tokens)
        .additional_params(json_response_params())
        .build();

    agent
        .chat(prompt.user.clone(), vec![])
        .await
        .map_err(|e| ProviderError::Request(e.to_string()))
}

#[async_trait]
impl CompletionBackend for RigCompletionBackend {
    async fn complete(&self, prompt: &PromptPair) -> Result<String, ProviderError> {
        debug!(model = %self.settings.model, prompt_len = prompt.user.len(), "Sending completion request");

        let raw = match &self.client {
            ProviderClient::OpenAi(client) => {
                chat_once(client.agent(&self.settings.model), &self.settings, prompt).await?
            }
            ProviderClient::OpenRouter(client) => {
                chat_once(client.agent(&self.settings.model), &self.settings, prompt).await?
            }
        };

        if raw.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_json_object_responses() {
        let params = json_response_params();
        assert_eq!(params["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_default_settings() {
        let settings = CompletionSettings::default();
        assert_eq!(settings.model, "gpt-3.5-turbo-1106");
        assert_eq!(settings.temperature, 0.7);
        assert_eq!(settings.max_tokens, 2000);
    }
}
