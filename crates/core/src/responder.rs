use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use thiserror::Error;
use tracing::{debug, warn};

use crate::intent::CONFIDENCE_MEDIUM;
use crate::models::{ClassificationResult, Intent, Reply, ReplyOrigin};

pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(15);

pub const GENERIC_ACKNOWLEDGEMENTS: &[&str] = &[
    "That's an interesting thought, Chief 👑. Tell me more!",
    "Hmm... I like where this is going. Maybe try something creative?",
    "Good question, Chief. I'd say keep exploring that idea.",
    "I feel you. Maybe take a short break and come back refreshed?",
    "That sounds like something we can solve together, Chief 😎",
    "Not totally sure, but it sounds like you're onto something smart.",
    "Let's think about it logically. What's your first instinct?",
    "Haha, I like your curiosity, Chief. Let's break this down!",
];

#[derive(Debug, Clone, Copy)]
enum KeywordMatch {
    Substring,
    WholeWord,
}

/// Checked in order. Short greetings only count as whole words so that
/// "thinking" or "this" never read as "hi".
const KEYWORD_REPLIES: &[(KeywordMatch, &[&str], &str)] = &[
    (
        KeywordMatch::Substring,
        &["bored"],
        "Sounds like you need a challenge, Chief 👑. How about learning something new?",
    ),
    (
        KeywordMatch::Substring,
        &["sad"],
        "Hey, tough times happen, but you've got this, Chief. Keep your head high 💪",
    ),
    (
        KeywordMatch::WholeWord,
        &["hello", "hi"],
        "Hey Chief 👑! How's it going today?",
    ),
    (
        KeywordMatch::Substring,
        &["bye"],
        "Catch you later, Chief! 👋 Stay awesome.",
    ),
];

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no valid LLM provider configured (got `{0}`)")]
    ProviderDisabled(String),
    #[error("no API key configured for the generation service")]
    MissingCredentials,
    #[error("generation service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generation request failed: {0}")]
    Transport(String),
    #[error("generation request timed out after {0:?}")]
    Timeout(Duration),
    #[error("generation service returned no text")]
    EmptyOutput,
}

impl GenerationError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::ProviderDisabled(_) | Self::MissingCredentials)
    }
}

/// Remote chat-completion capability: prompt in, text out.
pub trait ReplyGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String, GenerationError>> + Send;
}

pub fn template_for(intent: Intent) -> Option<&'static str> {
    match intent {
        Intent::Greeting => Some("Hey Chief 👑! How can I assist you today?"),
        Intent::Goodbye => Some("Take care, Chief! 👋 See you soon."),
        Intent::Thanks => Some("Always a pleasure to help, Chief 🙌"),
        Intent::AboutBot => {
            Some("I'm ChiefAI, your personal chatbot. Ready to assist anytime.")
        }
        Intent::Help
        | Intent::Hours
        | Intent::Pricing
        | Intent::FaqOrderStatus
        | Intent::Unknown => None,
    }
}

/// Picks the reply for a message: a canned template for small-talk intents,
/// otherwise the generation service, with a local reply when that fails.
pub struct Responder<G> {
    generator: G,
    timeout: Duration,
    rng: Mutex<StdRng>,
}

impl<G> Responder<G>
where
    G: ReplyGenerator,
{
    pub fn new(generator: G) -> Self {
        Self::with_rng(generator, StdRng::from_os_rng())
    }

    pub fn with_rng(generator: G, rng: StdRng) -> Self {
        Self {
            generator,
            timeout: DEFAULT_GENERATION_TIMEOUT,
            rng: Mutex::new(rng),
        }
    }

    pub fn with_seed(generator: G, seed: u64) -> Self {
        Self::with_rng(generator, StdRng::seed_from_u64(seed))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub async fn decide(
        &self,
        raw_text: &str,
        classification: Option<&ClassificationResult>,
    ) -> Reply {
        if let Some(classification) = classification {
            if let Some(template) = template_for(classification.intent) {
                return Reply {
                    text: template.to_string(),
                    origin: ReplyOrigin::Template {
                        intent: classification.intent,
                    },
                };
            }
            if classification.confidence < CONFIDENCE_MEDIUM {
                debug!(
                    confidence = classification.confidence,
                    "low confidence classification, delegating"
                );
            }
        }

        match self.delegate(raw_text).await {
            Ok(text) => Reply {
                text,
                origin: ReplyOrigin::Generated,
            },
            Err(error) => {
                if error.is_configuration() {
                    warn!(error = %error, "generation service is not configured");
                } else {
                    warn!(error = %error, "generation failed, using local reply");
                }
                Reply {
                    text: self.simulate_reply(raw_text),
                    origin: ReplyOrigin::LocalFallback {
                        reason: error.to_string(),
                    },
                }
            }
        }
    }

    async fn delegate(&self, prompt: &str) -> Result<String, GenerationError> {
        let text = tokio::time::timeout(self.timeout, self.generator.generate(prompt))
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout))??;

        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationError::EmptyOutput);
        }
        Ok(text.to_string())
    }

    fn simulate_reply(&self, raw_text: &str) -> String {
        if let Some(reply) = keyword_reply(raw_text) {
            return reply.to_string();
        }

        let mut rng = self.rng.lock();
        GENERIC_ACKNOWLEDGEMENTS
            .choose(&mut *rng)
            .copied()
            .unwrap_or(GENERIC_ACKNOWLEDGEMENTS[0])
            .to_string()
    }
}

fn keyword_reply(raw_text: &str) -> Option<&'static str> {
    let lower = raw_text.to_lowercase();
    let words = lower
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>();

    KEYWORD_REPLIES
        .iter()
        .find_map(|(matching, keywords, reply)| {
            keywords
                .iter()
                .any(|keyword| match matching {
                    KeywordMatch::Substring => lower.contains(keyword),
                    KeywordMatch::WholeWord => words.contains(keyword),
                })
                .then_some(*reply)
        })
}
