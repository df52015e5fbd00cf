use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
pub struct AppMetrics {
    messages_total: AtomicU64,
    template_replies_total: AtomicU64,
    generated_replies_total: AtomicU64,
    fallback_replies_total: AtomicU64,
    delivery_failures_total: AtomicU64,
    total_latency_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub messages_total: u64,
    pub template_replies_total: u64,
    pub generated_replies_total: u64,
    pub fallback_replies_total: u64,
    pub delivery_failures_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_message(&self) {
        self.messages_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("chief_messages_total").increment(1);
    }

    pub fn inc_template_reply(&self) {
        self.template_replies_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("chief_replies_total", "origin" => "template").increment(1);
    }

    pub fn inc_generated_reply(&self) {
        self.generated_replies_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("chief_replies_total", "origin" => "generated").increment(1);
    }

    pub fn inc_fallback_reply(&self) {
        self.fallback_replies_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("chief_replies_total", "origin" => "local_fallback").increment(1);
    }

    pub fn inc_delivery_failure(&self) {
        self.delivery_failures_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("chief_delivery_failures_total").increment(1);
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        metrics::histogram!("chief_message_latency_seconds").record(duration.as_secs_f64());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let messages = self.messages_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            messages_total: messages,
            template_replies_total: self.template_replies_total.load(Ordering::Relaxed),
            generated_replies_total: self.generated_replies_total.load(Ordering::Relaxed),
            fallback_replies_total: self.fallback_replies_total.load(Ordering::Relaxed),
            delivery_failures_total: self.delivery_failures_total.load(Ordering::Relaxed),
            avg_latency_millis: if messages == 0 {
                0.0
            } else {
                latency as f64 / messages as f64
            },
        }
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,chief_api=info,chief_agents=info,chief_core=info,chief_delivery=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .init();
    });
}
