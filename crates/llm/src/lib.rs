use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use chief_core::{GenerationError, ReplyGenerator};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const OPENROUTER_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Chief's friendly AI assistant.";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub endpoint: String,
    pub system_prompt: String,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openrouter".to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 200,
            endpoint: OPENROUTER_ENDPOINT.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            timeout: chief_core::responder::DEFAULT_GENERATION_TIMEOUT,
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            provider: env::var("LLM_PROVIDER")
                .map(|value| value.trim().to_lowercase())
                .unwrap_or(defaults.provider),
            api_key: env::var("OPENROUTER_API_KEY")
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            model: env::var("CHIEF_LLM_MODEL").unwrap_or(defaults.model),
            endpoint: env::var("CHIEF_LLM_ENDPOINT").unwrap_or(defaults.endpoint),
            timeout: env::var("CHIEF_LLM_TIMEOUT_SECONDS")
                .ok()
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            ..defaults
        }
    }

    pub fn is_configured(&self) -> bool {
        self.provider == "openrouter" && self.api_key.is_some()
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    config: LlmConfig,
    http: Client,
}

impl OpenRouterClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(6))
            .timeout(config.timeout)
            .build()
            .context("failed to build generation HTTP client")?;
        Ok(Self { config, http })
    }
}

impl ReplyGenerator for OpenRouterClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        if self.config.provider != "openrouter" {
            return Err(GenerationError::ProviderDisabled(self.config.provider.clone()));
        }
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(GenerationError::MissingCredentials)?;

        let payload = ChatCompletionRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.config.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| self.transport_error(error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|error| self.transport_error(error))?;
        debug!(model = %self.config.model, choices = body.choices.len(), "completion received");

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(GenerationError::EmptyOutput)
    }
}

impl OpenRouterClient {
    fn transport_error(&self, error: reqwest::Error) -> GenerationError {
        if error.is_timeout() {
            GenerationError::Timeout(self.config.timeout)
        } else {
            GenerationError::Transport(error.to_string())
        }
    }
}
