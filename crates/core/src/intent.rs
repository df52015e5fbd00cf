use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::models::{ClassificationResult, EntityKind, Intent};

pub const CONFIDENCE_HIGH: f32 = 0.9;
pub const CONFIDENCE_MEDIUM: f32 = 0.6;
pub const CONFIDENCE_LOW: f32 = 0.35;
pub const ENTITY_BONUS: f32 = 0.15;
pub const ENTITY_BONUS_CEILING: f32 = 0.75;
/// Fallback classifiers report confidence in `[0, 1)`.
pub const MAX_FALLBACK_CONFIDENCE: f32 = 0.99;

/// Trigger phrases per intent, in evaluation order. The first matching row wins.
pub const INTENT_RULES: &[(Intent, &[&str])] = &[
    (Intent::Greeting, &["hi", "hello", "hey", "greetings"]),
    (Intent::Help, &["help", "support", "assist"]),
    (Intent::Hours, &["open", "close", "hours", "timings"]),
    (Intent::Pricing, &["price", "cost", "fee", "pricing"]),
    (
        Intent::FaqOrderStatus,
        &["order status", "where is my order", "track order"],
    ),
    (Intent::Goodbye, &["bye", "goodbye", "farewell", "see you"]),
    (Intent::Thanks, &["thanks", "thank you", "thx", "appreciate"]),
    (
        Intent::AboutBot,
        &["who are you", "what are you", "your name", "are you a bot"],
    ),
];

static RULE_PATTERNS: Lazy<Vec<(Intent, Vec<Regex>)>> = Lazy::new(|| {
    INTENT_RULES
        .iter()
        .map(|(intent, triggers)| {
            let patterns = triggers
                .iter()
                .map(|trigger| {
                    Regex::new(&format!(r"\b{}\b", regex::escape(trigger)))
                        .expect("valid intent trigger regex")
                })
                .collect();
            (*intent, patterns)
        })
        .collect()
});

static ENTITY_PATTERNS: Lazy<Vec<(EntityKind, Regex)>> = Lazy::new(|| {
    vec![
        (
            EntityKind::Date,
            Regex::new(
                r"\b\d{1,2}[/-]\d{1,2}(?:[/-]\d{2,4})?\b|\btomorrow\b|\btoday\b|\bnext week\b",
            )
            .expect("valid date regex"),
        ),
        (
            EntityKind::Email,
            Regex::new(r"[a-z0-9_.+\-]+@[a-z0-9\-]+\.[a-z0-9\-.]+").expect("valid email regex"),
        ),
        (
            EntityKind::Phone,
            Regex::new(r"\+?\d{7,15}").expect("valid phone regex"),
        ),
    ]
});

#[derive(Debug, Clone)]
pub struct IntentPrediction {
    pub intent: Intent,
    pub confidence: f32,
    pub model: &'static str,
}

/// Classifier consulted when no rule matches.
pub trait IntentClassifier: Send + Sync {
    fn predict(&self, normalized: &str) -> IntentPrediction;
}

/// Stand-in for a statistical model: always `unknown` with low confidence.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubIntentClassifier;

impl IntentClassifier for StubIntentClassifier {
    fn predict(&self, _normalized: &str) -> IntentPrediction {
        IntentPrediction {
            intent: Intent::Unknown,
            confidence: CONFIDENCE_LOW,
            model: "stub",
        }
    }
}

pub fn normalize_text(input: &str) -> String {
    let replaced = input
        .trim()
        .to_lowercase()
        .chars()
        .map(|ch| match ch {
            'a'..='z' | '0'..='9' | '/' | '@' | '+' | '-' | '.' => ch,
            _ => ' ',
        })
        .collect::<String>();

    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn classify_intent_rules(normalized: &str) -> Option<Intent> {
    RULE_PATTERNS.iter().find_map(|(intent, patterns)| {
        patterns
            .iter()
            .any(|pattern| pattern.is_match(normalized))
            .then_some(*intent)
    })
}

pub fn extract_entities(normalized: &str) -> BTreeMap<EntityKind, String> {
    ENTITY_PATTERNS
        .iter()
        .filter_map(|(kind, pattern)| {
            pattern
                .find(normalized)
                .map(|found| (*kind, found.as_str().to_string()))
        })
        .collect()
}

pub fn apply_entity_bonus(confidence: f32, has_entities: bool) -> f32 {
    if has_entities && confidence < CONFIDENCE_MEDIUM {
        ENTITY_BONUS_CEILING.min(confidence + ENTITY_BONUS)
    } else {
        confidence
    }
}

pub fn classify(raw_text: &str) -> ClassificationResult {
    classify_with(raw_text, &StubIntentClassifier)
}

pub fn classify_with(raw_text: &str, fallback: &dyn IntentClassifier) -> ClassificationResult {
    let normalized_text = normalize_text(raw_text);
    if normalized_text.is_empty() {
        return ClassificationResult {
            intent: Intent::Unknown,
            entities: BTreeMap::new(),
            confidence: 0.0,
            normalized_text,
        };
    }

    let (intent, confidence) = match classify_intent_rules(&normalized_text) {
        Some(intent) => (intent, CONFIDENCE_HIGH),
        None => {
            let prediction = fallback.predict(&normalized_text);
            debug!(
                model = prediction.model,
                intent = prediction.intent.as_label(),
                confidence = prediction.confidence,
                "no rule matched, using fallback classifier"
            );
            (prediction.intent, clamp_fallback_confidence(prediction.confidence))
        }
    };

    let entities = extract_entities(&normalized_text);
    let confidence = apply_entity_bonus(confidence, !entities.is_empty());

    ClassificationResult {
        intent,
        entities,
        confidence,
        normalized_text,
    }
}

fn clamp_fallback_confidence(confidence: f32) -> f32 {
    if confidence.is_finite() {
        confidence.clamp(0.0, MAX_FALLBACK_CONFIDENCE)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClassifier(Intent, f32);

    impl IntentClassifier for FixedClassifier {
        fn predict(&self, _normalized: &str) -> IntentPrediction {
            IntentPrediction {
                intent: self.0,
                confidence: self.1,
                model: "fixed",
            }
        }
    }

    #[test]
    fn normalizes_punctuation_and_whitespace() {
        assert_eq!(
            normalize_text("  Hey,   THERE!!\tWhat's   up?  "),
            "hey there what s up"
        );
        assert_eq!(
            normalize_text("Mail me: A.B+c@Example.com / +1-555"),
            "mail me a.b+c@example.com / +1-555"
        );
    }

    #[test]
    fn normalization_is_a_fixed_point() {
        for input in [
            "Hey there!",
            "  ¿Dónde está mi pedido? ",
            "CALL +44 7700 900123 @ 12/10",
            "",
            "...///",
        ] {
            let once = classify(input).normalized_text;
            assert_eq!(classify(&once).normalized_text, once);
        }
    }

    #[test]
    fn empty_input_is_unknown_with_zero_confidence() {
        let result = classify("");
        assert_eq!(result.intent, Intent::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert!(result.entities.is_empty());
    }

    #[test]
    fn greets() {
        let result = classify("Hey there!");
        assert_eq!(result.intent, Intent::Greeting);
        assert!(result.confidence >= 0.8);
    }

    #[test]
    fn detects_hours() {
        assert_eq!(classify("What are your hours?").intent, Intent::Hours);
    }

    #[test]
    fn extracts_date_from_help_request() {
        let result = classify("I need support on 12/10/2025");
        assert_eq!(result.intent, Intent::Help);
        assert_eq!(result.entity(EntityKind::Date), Some("12/10/2025"));
        assert_eq!(result.confidence, CONFIDENCE_HIGH);
    }

    #[test]
    fn first_rule_row_wins() {
        // greeting is evaluated before pricing
        assert_eq!(classify("hello, what is the price").intent, Intent::Greeting);
        assert_eq!(classify("thanks for the help").intent, Intent::Help);
    }

    #[test]
    fn triggers_respect_word_boundaries() {
        assert_eq!(classify("this is a whistle").intent, Intent::Unknown);
        assert_eq!(classify("the shop is closed").intent, Intent::Unknown);
        assert_eq!(classify("where is my order?").intent, Intent::FaqOrderStatus);
    }

    #[test]
    fn entity_only_message_gets_bonus() {
        let result = classify("reach me at jane.doe@example.com");
        assert_eq!(result.intent, Intent::Unknown);
        assert!((result.confidence - 0.5).abs() < 1e-6);
        assert_eq!(
            result.entity(EntityKind::Email),
            Some("jane.doe@example.com")
        );
    }

    #[test]
    fn extracts_multiple_kinds_first_match_only() {
        let result = classify("call +15551234567 or 5559876543 tomorrow, or today");
        assert_eq!(result.entity(EntityKind::Phone), Some("+15551234567"));
        assert_eq!(result.entity(EntityKind::Date), Some("tomorrow"));
        assert_eq!(result.entity(EntityKind::Email), None);
    }

    #[test]
    fn bonus_applies_only_to_low_confidence_results() {
        assert_eq!(apply_entity_bonus(0.7, true), 0.7);
        assert_eq!(apply_entity_bonus(0.2, false), 0.2);

        let boosted = apply_entity_bonus(0.59, true);
        assert!((boosted - 0.74).abs() < 1e-6);
        assert!(boosted <= ENTITY_BONUS_CEILING);
        assert!(apply_entity_bonus(0.5999, true) <= ENTITY_BONUS_CEILING);
    }

    #[test]
    fn fallback_confidence_stays_below_one() {
        let result = classify_with("blah blah", &FixedClassifier(Intent::Pricing, 1.4));
        assert_eq!(result.intent, Intent::Pricing);
        assert!(result.confidence < 1.0);

        let result = classify_with("blah blah", &FixedClassifier(Intent::Pricing, f32::NAN));
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn confidence_in_unit_range_for_assorted_input() {
        for input in ["🙂🙂", "\n\t", "PRICE!!! 12-12 a@b.co", "x".repeat(5000).as_str()] {
            let result = classify(input);
            assert!((0.0..=1.0).contains(&result.confidence));
        }
    }
}
