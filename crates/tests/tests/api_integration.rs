use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chief_agents::ChiefConfig;
use chief_api::build_app;
use chief_core::template_for;
use chief_core::Intent;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn app() -> Router {
    build_app(&ChiefConfig::default())
        .await
        .expect("app should build")
}

fn webhook_request(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn simulated_payload(sender: &str, texts: &[&str]) -> Value {
    json!({
        "entry": [{
            "messaging": texts
                .iter()
                .map(|text| json!({ "sender": { "id": sender }, "message": { "text": text } }))
                .collect::<Vec<_>>()
        }]
    })
}

#[tokio::test]
async fn health_reports_dev_mode() {
    let app = app().await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = json_body(response).await;
    assert_eq!(parsed["status"], "ok");
    assert_eq!(parsed["dev_mode"], true);
    assert_eq!(parsed["metrics"]["messages_total"], 0);
}

#[tokio::test]
async fn webhook_replies_to_every_message() {
    let app = app().await;
    let payload = simulated_payload(
        "test_user_1",
        &["Hello", "Can you tell me the pricing?", "I want to track my order #12345"],
    );

    let response = app
        .clone()
        .oneshot(webhook_request(payload.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = json_body(response).await;
    assert_eq!(parsed["ok"], true);
    let responses = parsed["responses"].as_array().unwrap();
    assert_eq!(responses.len(), 3);

    assert_eq!(responses[0]["to"], "test_user_1");
    assert_eq!(responses[0]["sent"]["status"], "simulated");
    assert_eq!(
        responses[0]["sent"]["message"],
        template_for(Intent::Greeting).unwrap()
    );

    // no API key configured: the delegated replies degrade to local text
    for response in &responses[1..] {
        assert_eq!(response["sent"]["status"], "simulated");
        assert!(!response["sent"]["message"].as_str().unwrap().is_empty());
    }

    let health = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let parsed = json_body(health).await;
    assert_eq!(parsed["metrics"]["messages_total"], 3);
    assert_eq!(parsed["metrics"]["template_replies_total"], 1);
    assert_eq!(parsed["metrics"]["fallback_replies_total"], 2);
}

#[tokio::test]
async fn webhook_skips_events_without_text() {
    let app = app().await;
    let payload = json!({
        "entry": [{
            "messaging": [
                { "sender": { "id": "u1" }, "message": { "attachments": [{ "type": "image" }] } },
                { "sender": { "id": "u2" }, "comment": { "text": "thanks!" } }
            ]
        }]
    });

    let response = app.oneshot(webhook_request(payload.to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = json_body(response).await;
    let responses = parsed["responses"].as_array().unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["to"], "u2");
    assert_eq!(
        responses[0]["sent"]["message"],
        template_for(Intent::Thanks).unwrap()
    );
}

#[tokio::test]
async fn webhook_rejects_malformed_payloads() {
    let app = app().await;

    for body in ["not json".to_string(), "[1, 2, 3]".to_string(), "\"entry\"".to_string()] {
        let response = app.clone().oneshot(webhook_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn webhook_rejects_oversized_payloads() {
    let app = app().await;
    let payload = json!({ "entry": [], "padding": "x".repeat(200_100) });

    let response = app.oneshot(webhook_request(payload.to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_answers_large_bodies_with_bad_request() {
    let app = app().await;

    let payload = json!({ "entry": [], "padding": "x".repeat(300_000) });
    let response = app
        .clone()
        .oneshot(webhook_request(payload.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let payload = json!({ "entry": [], "padding": "x".repeat(2 * 1024 * 1024) });
    let response = app.oneshot(webhook_request(payload.to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
