mod centroid;
mod fallback;

use std::path::Path;
use std::sync::Arc;

use chief_core::{IntentClassifier, StubIntentClassifier};
use tracing::{info, warn};

pub use centroid::CentroidIntentClassifier;
pub use chief_core::IntentPrediction;
pub use fallback::HashEmbeddingModel;

pub trait EmbeddingModel: Send + Sync {
    fn model_name(&self) -> &'static str;
    fn embed(&self, text: &str) -> Vec<f32>;
}

#[derive(Clone)]
pub struct MlStack {
    pub classifier: Arc<dyn IntentClassifier>,
    pub model: &'static str,
}

impl MlStack {
    /// Uses a centroid classifier trained from `dataset` when it loads,
    /// the constant stub otherwise.
    pub fn load(dataset: Option<&Path>) -> Self {
        let Some(path) = dataset else {
            return Self::stub();
        };

        if !path.exists() {
            warn!(path = %path.display(), "intent dataset not found, using stub classifier");
            return Self::stub();
        }

        let embedder = Arc::new(HashEmbeddingModel::new(192));
        match CentroidIntentClassifier::from_jsonl(path, embedder, "hash-centroid-intent") {
            Ok(classifier) => {
                info!(path = %path.display(), intents = classifier.intent_count(), "intent dataset loaded");
                Self {
                    classifier: Arc::new(classifier),
                    model: "hash-centroid-intent",
                }
            }
            Err(error) => {
                warn!(error = %error, "intent dataset rejected, using stub classifier");
                Self::stub()
            }
        }
    }

    pub fn stub() -> Self {
        Self {
            classifier: Arc::new(StubIntentClassifier),
            model: "stub",
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chief_core::{classify_with, Intent};

    use super::*;

    #[test]
    fn missing_dataset_falls_back_to_stub() {
        let stack = MlStack::load(Some(Path::new("/definitely/not/here.jsonl")));
        assert_eq!(stack.model, "stub");
        assert_eq!(stack.classifier.predict("anything").intent, Intent::Unknown);
    }

    #[test]
    fn dataset_backed_stack_classifies_unmatched_text() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"text": "my parcel never arrived", "intent": "faq_order_status"}}"#).unwrap();
        writeln!(file, r#"{{"text": "parcel delivery late again", "intent": "faq_order_status"}}"#).unwrap();
        writeln!(file, r#"{{"text": "how much is the monthly plan", "intent": "pricing"}}"#).unwrap();

        let stack = MlStack::load(Some(file.path()));
        assert_eq!(stack.model, "hash-centroid-intent");

        let result = classify_with("parcel never arrived", stack.classifier.as_ref());
        assert_eq!(result.intent, Intent::FaqOrderStatus);
        assert!(result.confidence < 1.0);
    }
}
