use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chief_core::{Intent, IntentClassifier, IntentPrediction};
use serde::Deserialize;

use crate::EmbeddingModel;

#[derive(Debug, Deserialize)]
struct LabeledExample {
    text: String,
    intent: String,
}

/// Nearest-centroid classifier over embedded, labeled example messages.
#[derive(Clone)]
pub struct CentroidIntentClassifier {
    model_name: &'static str,
    centroids: Vec<(Intent, Vec<f32>)>,
    embedder: Arc<dyn EmbeddingModel>,
}

impl CentroidIntentClassifier {
    pub fn from_jsonl(
        path: impl AsRef<Path>,
        embedder: Arc<dyn EmbeddingModel>,
        model_name: &'static str,
    ) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref()).with_context(|| {
            format!(
                "failed reading intent training dataset at {}",
                path.as_ref().display()
            )
        })?;

        let mut by_intent: HashMap<Intent, Vec<Vec<f32>>> = HashMap::new();

        for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let example: LabeledExample =
                serde_json::from_str(line).context("invalid jsonl training line")?;
            if let Some(intent) = Intent::parse(&example.intent) {
                let normalized = chief_core::normalize_text(&example.text);
                by_intent
                    .entry(intent)
                    .or_default()
                    .push(embedder.embed(&normalized));
            }
        }

        let mut centroids = by_intent
            .into_iter()
            .filter(|(_, vectors)| !vectors.is_empty())
            .map(|(intent, vectors)| (intent, centroid(&vectors)))
            .collect::<Vec<_>>();
        centroids.sort_by_key(|(intent, _)| *intent);

        if centroids.is_empty() {
            anyhow::bail!("training dataset produced zero intent centroids");
        }

        Ok(Self {
            model_name,
            centroids,
            embedder,
        })
    }

    pub fn intent_count(&self) -> usize {
        self.centroids.len()
    }
}

impl IntentClassifier for CentroidIntentClassifier {
    fn predict(&self, normalized: &str) -> IntentPrediction {
        let query = self.embedder.embed(normalized);
        let mut best_intent = Intent::Unknown;
        let mut best_score = -1.0_f32;

        for (intent, center) in &self.centroids {
            let score = cosine_similarity(&query, center);
            if score > best_score {
                best_score = score;
                best_intent = *intent;
            }
        }

        IntentPrediction {
            intent: best_intent,
            confidence: ((best_score + 1.0) / 2.0).clamp(0.0, 1.0),
            model: self.model_name,
        }
    }
}

fn centroid(vectors: &[Vec<f32>]) -> Vec<f32> {
    let dims = vectors.first().map(Vec::len).unwrap_or(0);
    let mut acc = vec![0.0_f32; dims];

    for vector in vectors {
        for (idx, value) in vector.iter().enumerate() {
            acc[idx] += value;
        }
    }

    for value in &mut acc {
        *value /= vectors.len() as f32;
    }
    crate::fallback::normalize(&mut acc);
    acc
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut a_norm = 0.0;
    let mut b_norm = 0.0;
    for (lhs, rhs) in a.iter().zip(b.iter()) {
        dot += lhs * rhs;
        a_norm += lhs * lhs;
        b_norm += rhs * rhs;
    }

    if a_norm == 0.0 || b_norm == 0.0 {
        0.0
    } else {
        dot / (a_norm.sqrt() * b_norm.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::HashEmbeddingModel;

    #[test]
    fn rejects_dataset_without_known_intents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"text": "hello", "intent": "weather"}}"#).unwrap();

        let result = CentroidIntentClassifier::from_jsonl(
            file.path(),
            Arc::new(HashEmbeddingModel::new(64)),
            "test",
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_malformed_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not json").unwrap();

        let result = CentroidIntentClassifier::from_jsonl(
            file.path(),
            Arc::new(HashEmbeddingModel::new(64)),
            "test",
        );
        assert!(result.is_err());
    }

    #[test]
    fn empty_query_scores_zero_similarity() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
