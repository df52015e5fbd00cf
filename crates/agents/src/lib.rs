pub mod config;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chief_core::{
    classify_with, ClassificationResult, InboundMessage, IntentClassifier, InteractionRecord,
    Reply, ReplyGenerator, ReplyOrigin, Responder,
};
use chief_delivery::{SendOutcome, Sender};
use chief_llm::OpenRouterClient;
use chief_ml::MlStack;
use chief_observability::AppMetrics;
use chief_storage::{InteractionRepository, Store, UserMemory, UserMemoryRepository};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, instrument};

pub use config::ChiefConfig;

pub type DefaultAgent = ReplyAgent<Store, OpenRouterClient>;

#[derive(Debug, Clone, Serialize)]
pub struct HandledMessage {
    pub sender_id: String,
    pub classification: ClassificationResult,
    pub reply: Reply,
    pub persisted: bool,
    pub delivery: Option<SendOutcome>,
}

/// Runs one inbound message through classification, reply selection,
/// persistence and (optionally) outbound delivery.
pub struct ReplyAgent<S, G>
where
    S: InteractionRepository + UserMemoryRepository,
    G: ReplyGenerator,
{
    classifier: Arc<dyn IntentClassifier>,
    responder: Responder<G>,
    store: Arc<S>,
    sender: Sender,
    metrics: Arc<AppMetrics>,
}

impl<S, G> ReplyAgent<S, G>
where
    S: InteractionRepository + UserMemoryRepository,
    G: ReplyGenerator,
{
    pub fn new(
        ml_stack: MlStack,
        responder: Responder<G>,
        store: Arc<S>,
        sender: Sender,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            classifier: ml_stack.classifier,
            responder,
            store,
            sender,
            metrics,
        }
    }

    pub fn classify(&self, text: &str) -> ClassificationResult {
        classify_with(text, self.classifier.as_ref())
    }

    pub fn metrics(&self) -> &Arc<AppMetrics> {
        &self.metrics
    }

    /// Classifies, replies and records the interaction; nothing is sent.
    #[instrument(skip(self, message), fields(sender = %message.sender_id))]
    pub async fn respond(&self, message: &InboundMessage) -> HandledMessage {
        let started = Instant::now();
        self.metrics.inc_message();

        let classification = self.classify(&message.text);
        let reply = self
            .responder
            .decide(&message.text, Some(&classification))
            .await;

        match &reply.origin {
            ReplyOrigin::Template { .. } => self.metrics.inc_template_reply(),
            ReplyOrigin::Generated => self.metrics.inc_generated_reply(),
            ReplyOrigin::LocalFallback { .. } => self.metrics.inc_fallback_reply(),
        }

        let persisted = match self.persist(message, &classification, &reply).await {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, "failed to persist interaction");
                false
            }
        };

        self.metrics.observe_latency(started.elapsed());
        info!(
            intent = classification.intent.as_label(),
            confidence = classification.confidence,
            entities = classification.entities.len(),
            degraded = reply.is_degraded(),
            persisted,
            "message handled"
        );

        HandledMessage {
            sender_id: message.sender_id.clone(),
            classification,
            reply,
            persisted,
            delivery: None,
        }
    }

    /// Full webhook path: [`Self::respond`] followed by delivery to the sender.
    pub async fn handle_inbound(&self, message: &InboundMessage) -> HandledMessage {
        let mut handled = self.respond(message).await;

        let outcome = self.sender.send(&message.sender_id, &handled.reply.text).await;
        if !outcome.is_delivered() {
            self.metrics.inc_delivery_failure();
        }
        info!(sender = %message.sender_id, delivered = outcome.is_delivered(), "reply dispatched");

        handled.delivery = Some(outcome);
        handled
    }

    pub async fn recent_interactions(&self, limit: usize) -> Result<Vec<InteractionRecord>> {
        self.store.recent_interactions(limit).await
    }

    pub async fn user_memory(&self, user_id: &str) -> Result<UserMemory> {
        self.store.load_user_memory(user_id).await
    }

    pub async fn clear_user_memory(&self, user_id: &str) -> Result<bool> {
        self.store.clear_user_memory(user_id).await
    }

    async fn persist(
        &self,
        message: &InboundMessage,
        classification: &ClassificationResult,
        reply: &Reply,
    ) -> Result<()> {
        let now = Utc::now();

        self.store
            .record_interaction(&InteractionRecord {
                ts: now,
                user_id: message.sender_id.clone(),
                message: message.text.clone(),
                intent: Some(classification.intent),
                confidence: classification.confidence,
                response: reply.text.clone(),
            })
            .await?;

        let mut memory = self.store.load_user_memory(&message.sender_id).await?;
        remember(&mut memory, classification, now.to_rfc3339());
        self.store
            .save_user_memory(&message.sender_id, &memory)
            .await
    }
}

fn remember(memory: &mut UserMemory, classification: &ClassificationResult, seen_at: String) {
    let count = memory
        .get("message_count")
        .and_then(|value| value.as_u64())
        .unwrap_or(0);
    memory.insert("message_count".to_string(), json!(count + 1));
    memory.insert(
        "last_intent".to_string(),
        json!(classification.intent.as_label()),
    );
    memory.insert("last_seen".to_string(), json!(seen_at));

    for (kind, value) in &classification.entities {
        memory.insert(format!("last_{}", kind.as_label()), json!(value));
    }
}

pub async fn build_agent(config: &ChiefConfig, metrics: Arc<AppMetrics>) -> Result<DefaultAgent> {
    let ml_stack = MlStack::load(config.intent_dataset.as_deref());
    let generator = OpenRouterClient::new(config.llm.clone())?;
    let responder = Responder::new(generator).with_timeout(config.llm.timeout);
    let store = Store::from_url(config.database_url.as_deref()).await?;
    let sender = Sender::from_config(&config.delivery)?;

    info!(
        dev_mode = config.dev_mode,
        classifier = ml_stack.model,
        llm_configured = config.llm.is_configured(),
        sqlite = config.database_url.is_some(),
        "agent initialised"
    );

    Ok(ReplyAgent::new(
        ml_stack,
        responder,
        Arc::new(store),
        sender,
        metrics,
    ))
}

#[cfg(test)]
mod tests {
    use chief_core::{EntityKind, GenerationError, Intent};
    use chief_storage::MemoryStore;

    use super::*;

    struct CannedGenerator(Result<&'static str, ()>);

    impl ReplyGenerator for CannedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.0
                .map(str::to_string)
                .map_err(|_| GenerationError::MissingCredentials)
        }
    }

    fn agent(generator: CannedGenerator) -> ReplyAgent<MemoryStore, CannedGenerator> {
        ReplyAgent::new(
            MlStack::stub(),
            Responder::with_seed(generator, 11),
            Arc::new(MemoryStore::new()),
            Sender::Simulated,
            AppMetrics::shared(),
        )
    }

    fn inbound(text: &str) -> InboundMessage {
        InboundMessage {
            sender_id: "user-1".to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn greeting_is_templated_persisted_and_remembered() {
        let agent = agent(CannedGenerator(Ok("unused")));
        let handled = agent.respond(&inbound("Hello!")).await;

        assert_eq!(handled.classification.intent, Intent::Greeting);
        assert!(matches!(handled.reply.origin, ReplyOrigin::Template { .. }));
        assert!(handled.persisted);
        assert!(handled.delivery.is_none());

        let history = agent.recent_interactions(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].intent, Some(Intent::Greeting));

        let memory = agent.user_memory("user-1").await.unwrap();
        assert_eq!(memory["message_count"], json!(1));
        assert_eq!(memory["last_intent"], json!("greeting"));
    }

    #[tokio::test]
    async fn generated_reply_is_delivered() {
        let agent = agent(CannedGenerator(Ok("We open at nine.")));
        let handled = agent.handle_inbound(&inbound("When do you open?")).await;

        assert_eq!(handled.reply.text, "We open at nine.");
        assert_eq!(
            handled.delivery,
            Some(SendOutcome::Simulated {
                to: "user-1".to_string(),
                message: "We open at nine.".to_string()
            })
        );
        assert_eq!(agent.metrics().snapshot().generated_replies_total, 1);
    }

    #[tokio::test]
    async fn failed_generation_still_replies_and_remembers_entities() {
        let agent = agent(CannedGenerator(Err(())));
        agent.respond(&inbound("hi")).await;
        let handled = agent
            .respond(&inbound("my email is sam@example.org, call +447700900123"))
            .await;

        assert!(handled.reply.is_degraded());
        assert!(!handled.reply.text.is_empty());
        assert_eq!(
            handled.classification.entity(EntityKind::Email),
            Some("sam@example.org")
        );

        let memory = agent.user_memory("user-1").await.unwrap();
        assert_eq!(memory["message_count"], json!(2));
        assert_eq!(memory["last_email"], json!("sam@example.org"));
        assert_eq!(memory["last_phone"], json!("+447700900123"));
        assert_eq!(agent.metrics().snapshot().fallback_replies_total, 1);

        assert!(agent.clear_user_memory("user-1").await.unwrap());
    }
}
