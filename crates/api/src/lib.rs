use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use chief_agents::{build_agent, ChiefConfig, DefaultAgent};
use chief_core::InboundMessage;
use chief_observability::AppMetrics;
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

/// Payloads whose serialized form exceeds this are rejected.
pub const MAX_WEBHOOK_PAYLOAD_CHARS: usize = 200_000;
/// Bodies past this are rejected while reading, and answered like any other
/// invalid payload.
const REQUEST_BODY_LIMIT_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<DefaultAgent>,
    pub metrics: Arc<AppMetrics>,
    pub dev_mode: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    dev_mode: bool,
    timestamp_utc: String,
    metrics: chief_observability::MetricsSnapshot,
}

pub async fn build_app(config: &ChiefConfig) -> Result<Router> {
    let metrics = AppMetrics::shared();
    let agent = Arc::new(build_agent(config, metrics.clone()).await?);

    Ok(build_router(ApiState {
        agent,
        metrics,
        dev_mode: config.dev_mode,
    }))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(DefaultBodyLimit::max(REQUEST_BODY_LIMIT_BYTES))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        dev_mode: state.dev_mode,
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        metrics: state.metrics.snapshot(),
    };
    (StatusCode::OK, Json(payload))
}

async fn webhook(
    State(state): State<ApiState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection, "unreadable webhook body");
            return bad_request();
        }
    };
    let payload = match serde_json::from_slice::<Value>(&body) {
        Ok(payload @ Value::Object(_)) => payload,
        Ok(_) | Err(_) => return bad_request(),
    };
    if payload.to_string().len() > MAX_WEBHOOK_PAYLOAD_CHARS {
        return bad_request();
    }

    let events = extract_events(&payload);
    debug!(events = events.len(), "webhook payload accepted");

    let mut responses = Vec::with_capacity(events.len());
    for event in &events {
        let handled = state.agent.handle_inbound(event).await;
        responses.push(json!({
            "to": handled.sender_id,
            "sent": handled.delivery,
        }));
    }

    (
        StatusCode::OK,
        Json(json!({ "ok": true, "responses": responses })),
    )
        .into_response()
}

fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, "Bad Request").into_response()
}

/// Pulls `(sender, text)` pairs out of `entry[].messaging[]`.
///
/// The sender comes from `sender.id` or `from.id`; the text from
/// `message.text`, or `comment.text` when there is no `message`. Events
/// without text or sender are skipped.
pub fn extract_events(payload: &Value) -> Vec<InboundMessage> {
    let entries = payload
        .get("entry")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut events = Vec::new();
    for entry in entries {
        let messaging = entry
            .get("messaging")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for item in messaging {
            let text = match item.get("message") {
                Some(message) => message.get("text"),
                None => item.get("comment").and_then(|comment| comment.get("text")),
            }
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty());
            let Some(text) = text else {
                continue;
            };

            let sender_id = ["sender", "from"]
                .iter()
                .find_map(|key| item.get(*key).and_then(|party| party.get("id")))
                .and_then(id_to_string);
            let Some(sender_id) = sender_id else {
                warn!("skipping messaging event without sender id");
                continue;
            };

            events.push(InboundMessage {
                sender_id,
                text: text.to_string(),
            });
        }
    }
    events
}

fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_messages_and_comments() {
        let payload = json!({
            "entry": [
                {
                    "messaging": [
                        { "sender": { "id": "u1" }, "message": { "text": "Hello" } },
                        { "from": { "id": 42 }, "comment": { "text": "price?" } },
                        { "sender": { "id": "u3" }, "message": { "attachments": [] } },
                        { "sender": { "id": "u4" }, "message": { "text": "" }, "comment": { "text": "ignored" } },
                        { "message": { "text": "no sender" } }
                    ]
                },
                { "changes": [] }
            ]
        });

        let events = extract_events(&payload);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sender_id, "u1");
        assert_eq!(events[0].text, "Hello");
        assert_eq!(events[1].sender_id, "42");
        assert_eq!(events[1].text, "price?");
    }

    #[test]
    fn payload_without_entries_has_no_events() {
        assert!(extract_events(&json!({ "object": "instagram" })).is_empty());
    }
}
