use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    Help,
    Hours,
    Pricing,
    FaqOrderStatus,
    Goodbye,
    Thanks,
    AboutBot,
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 9] = [
        Self::Greeting,
        Self::Help,
        Self::Hours,
        Self::Pricing,
        Self::FaqOrderStatus,
        Self::Goodbye,
        Self::Thanks,
        Self::AboutBot,
        Self::Unknown,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "greeting" => Some(Self::Greeting),
            "help" => Some(Self::Help),
            "hours" => Some(Self::Hours),
            "pricing" => Some(Self::Pricing),
            "faq_order_status" => Some(Self::FaqOrderStatus),
            "goodbye" => Some(Self::Goodbye),
            "thanks" => Some(Self::Thanks),
            "about_bot" => Some(Self::AboutBot),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn as_label(self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Help => "help",
            Self::Hours => "hours",
            Self::Pricing => "pricing",
            Self::FaqOrderStatus => "faq_order_status",
            Self::Goodbye => "goodbye",
            Self::Thanks => "thanks",
            Self::AboutBot => "about_bot",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Date,
    Email,
    Phone,
}

impl EntityKind {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Email => "email",
            Self::Phone => "phone",
        }
    }
}

/// Output of the NLU stage for a single inbound message.
///
/// Produced once by [`crate::classify`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub intent: Intent,
    pub entities: BTreeMap<EntityKind, String>,
    pub confidence: f32,
    pub normalized_text: String,
}

impl ClassificationResult {
    pub fn entity(&self, kind: EntityKind) -> Option<&str> {
        self.entities.get(&kind).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyOrigin {
    Template { intent: Intent },
    Generated,
    LocalFallback { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    pub origin: ReplyOrigin,
}

impl Reply {
    pub fn is_degraded(&self) -> bool {
        matches!(self.origin, ReplyOrigin::LocalFallback { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub sender_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub ts: DateTime<Utc>,
    pub user_id: String,
    pub message: String,
    pub intent: Option<Intent>,
    pub confidence: f32,
    pub response: String,
}
