pub mod intent;
pub mod models;
pub mod responder;

pub use intent::{
    classify, classify_intent_rules, classify_with, extract_entities, normalize_text,
    IntentClassifier, IntentPrediction, StubIntentClassifier,
};
pub use models::*;
pub use responder::{template_for, GenerationError, ReplyGenerator, Responder};
