use std::env;
use std::path::PathBuf;

use chief_delivery::DeliveryConfig;
use chief_llm::LlmConfig;

/// Process-wide settings, read once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct ChiefConfig {
    pub dev_mode: bool,
    pub database_url: Option<String>,
    pub intent_dataset: Option<PathBuf>,
    pub llm: LlmConfig,
    pub delivery: DeliveryConfig,
}

impl Default for ChiefConfig {
    fn default() -> Self {
        Self {
            dev_mode: true,
            database_url: None,
            intent_dataset: None,
            llm: LlmConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl ChiefConfig {
    pub fn from_env() -> Self {
        let dev_mode = env::var("DEV_MODE")
            .map(|value| parse_flag(&value))
            .unwrap_or(true);

        Self {
            dev_mode,
            database_url: non_empty_var("CHIEF_DATABASE_URL"),
            intent_dataset: non_empty_var("CHIEF_INTENT_DATASET").map(PathBuf::from),
            llm: LlmConfig::from_env(),
            delivery: DeliveryConfig::from_env(dev_mode),
        }
    }
}

pub fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
