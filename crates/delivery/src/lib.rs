use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

pub const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v16.0";
pub const MAX_BACKOFF_STEPS: u64 = 60;

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub dev_mode: bool,
    pub access_token: Option<String>,
    pub api_base: String,
    pub max_attempts: u32,
    pub backoff_unit: Duration,
    pub request_timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            dev_mode: true,
            access_token: None,
            api_base: DEFAULT_API_BASE.to_string(),
            max_attempts: 5,
            backoff_unit: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl DeliveryConfig {
    pub fn from_env(dev_mode: bool) -> Self {
        let defaults = Self::default();
        Self {
            dev_mode,
            access_token: env::var("IG_ACCESS_TOKEN")
                .ok()
                .filter(|value| !value.trim().is_empty()),
            api_base: env::var("IG_API_BASE").unwrap_or(defaults.api_base),
            ..defaults
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SendOutcome {
    Simulated {
        to: String,
        message: String,
    },
    Sent {
        result: Value,
    },
    Failed {
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl SendOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Simulated { .. } | Self::Sent { .. })
    }

    fn failed_with(error: &str) -> Self {
        Self::Failed {
            code: None,
            text: None,
            error: Some(error.to_string()),
        }
    }
}

/// Delay before retry `attempt` (zero-based): `2^attempt` units, capped at 60.
pub fn backoff_delay(unit: Duration, attempt: u32) -> Duration {
    let steps = 1_u64
        .checked_shl(attempt)
        .unwrap_or(u64::MAX)
        .min(MAX_BACKOFF_STEPS);
    unit.saturating_mul(steps as u32)
}

#[derive(Debug, Clone)]
pub struct GraphSender {
    http: Client,
    access_token: String,
    api_base: String,
    max_attempts: u32,
    backoff_unit: Duration,
}

impl GraphSender {
    pub fn new(config: &DeliveryConfig, access_token: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build delivery HTTP client")?;

        Ok(Self {
            http,
            access_token,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            max_attempts: config.max_attempts.max(1),
            backoff_unit: config.backoff_unit,
        })
    }

    pub async fn send(&self, recipient_id: &str, message_text: &str) -> SendOutcome {
        let url = format!("{}/{}/messages", self.api_base, recipient_id);
        let payload = json!({ "message": { "text": message_text } });

        for attempt in 0..self.max_attempts {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.access_token)
                .json(&payload)
                .send()
                .await;

            match response {
                Ok(response) if response.status() == StatusCode::OK => {
                    let result = response.json::<Value>().await.unwrap_or(Value::Null);
                    return SendOutcome::Sent { result };
                }
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let delay = backoff_delay(self.backoff_unit, attempt);
                    warn!(recipient = %recipient_id, attempt, ?delay, "rate limited by messaging provider");
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => {
                    let code = response.status().as_u16();
                    let text = response.text().await.unwrap_or_default();
                    error!(recipient = %recipient_id, code, body = %text, "send failed");
                    return SendOutcome::Failed {
                        code: Some(code),
                        text: Some(text),
                        error: None,
                    };
                }
                Err(err) => {
                    let delay = backoff_delay(self.backoff_unit, attempt);
                    warn!(recipient = %recipient_id, attempt, error = %err, "send request failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }

        SendOutcome::failed_with("max_retries_exceeded")
    }
}

#[derive(Debug, Clone)]
pub enum Sender {
    Simulated,
    Graph(GraphSender),
    Unconfigured,
}

impl Sender {
    pub fn from_config(config: &DeliveryConfig) -> Result<Self> {
        if config.dev_mode {
            return Ok(Self::Simulated);
        }

        match config.access_token.clone() {
            Some(token) => Ok(Self::Graph(GraphSender::new(config, token)?)),
            None => {
                warn!("IG_ACCESS_TOKEN is not set, outbound messages will fail");
                Ok(Self::Unconfigured)
            }
        }
    }

    pub async fn send(&self, recipient_id: &str, message_text: &str) -> SendOutcome {
        info!(recipient = %recipient_id, chars = message_text.chars().count(), "sending message");
        match self {
            Sender::Simulated => SendOutcome::Simulated {
                to: recipient_id.to_string(),
                message: message_text.to_string(),
            },
            Sender::Graph(sender) => sender.send(recipient_id, message_text).await,
            Sender::Unconfigured => SendOutcome::failed_with("missing_access_token"),
        }
    }
}
