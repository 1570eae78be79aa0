//! Integration tests: drive the router over the loopback transport and the in-memory telemetry store.
//!
//! Run with `cargo test`. The Redis-backed admin test needs `TEST_REDIS_URL`
//! (e.g. `redis://127.0.0.1:6379`) and is skipped when it is unset.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use livewire::repositories::RedisRepository;
use livewire::services::{AdminQuery, MemoryTelemetryStore, RedisAdmin};
use livewire::transport::LoopbackTransport;
use livewire::{create_app, AppState, HarnessConfig, LiveHarness};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

fn loopback_app(transport: LoopbackTransport) -> axum::Router {
    let config = HarnessConfig {
        scenario_observe_timeout: Duration::from_millis(500),
        ..HarnessConfig::default()
    };
    let harness = LiveHarness::new(Arc::new(transport), config);
    let state = AppState::new(harness, Arc::new(MemoryTelemetryStore::new()), None);
    create_app(state)
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, json)
}

#[tokio::test]
async fn health_returns_ok() {
    let app = loopback_app(LoopbackTransport::new());
    let (status, json) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.get("status").and_then(|v| v.as_str()), Some("ok"));
    assert_eq!(json.get("service").and_then(|v| v.as_str()), Some("livewire"));
}

#[tokio::test]
async fn connect_subscribe_publish_roundtrip() {
    let app = loopback_app(LoopbackTransport::new());

    let (status, json) = send(&app, "POST", "/live/connect", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "connected");

    let (status, json) = send(&app, "POST", "/live/subscribe", Some(json!({ "channel": "news" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["channel"], "news");
    assert_eq!(json["message_count"], 0);

    let (status, json) = send(
        &app,
        "POST",
        "/live/publish",
        Some(json!({ "channel": "news", "data": { "headline": "hi" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["message_id"].as_str().is_some());
    assert!(json["ack"].is_null());

    // The loopback echo is delivered by the pump task.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let (_, state) = send(&app, "GET", "/live/state", None).await;
    assert_eq!(state["is_connected"], true);
    assert_eq!(state["total_messages_received"], 1);
    assert_eq!(state["subscriptions"][0]["message_count"], 1);
    assert_eq!(state["subscriptions"][0]["last_message"], json!({ "headline": "hi" }));

    let (_, overview) = send(&app, "GET", "/telemetry/overview", None).await;
    assert_eq!(overview["total"], 1);
    assert_eq!(overview["successful"], 1);
}

#[tokio::test]
async fn publish_with_ack_is_recorded() {
    let app = loopback_app(LoopbackTransport::new().with_auto_ack("listener"));
    send(&app, "POST", "/live/connect", None).await;

    let (status, json) = send(
        &app,
        "POST",
        "/live/publish",
        Some(json!({ "channel": "orders", "data": {}, "wait_for_ack": true, "ack_timeout": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ack"]["status"], "success");
    assert_eq!(json["ack"]["client_id"], "listener");

    let (_, page) = send(&app, "GET", "/telemetry/publishes?channel=orders&status=success", None).await;
    assert_eq!(page["count"], 1);
    assert_eq!(page["publishes"][0]["message_id"], json["message_id"]);

    let (_, timeline) = send(&app, "GET", "/telemetry/channels", None).await;
    assert_eq!(timeline["channels"][0]["channel"], "orders");
}

#[tokio::test]
async fn publish_while_disconnected_is_conflict() {
    let app = loopback_app(LoopbackTransport::new());
    let (status, json) = send(&app, "POST", "/live/publish", Some(json!({ "channel": "news", "data": 1 }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("not connected"));

    let (_, overview) = send(&app, "GET", "/telemetry/overview", None).await;
    assert_eq!(overview["failed"], 1);
}

#[tokio::test]
async fn publish_rejects_invalid_body() {
    let app = loopback_app(LoopbackTransport::new());
    send(&app, "POST", "/live/connect", None).await;
    let (status, _) = send(&app, "POST", "/live/publish", Some(json!({ "channel": "", "data": 1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(
        &app,
        "POST",
        "/live/publish",
        Some(json!({ "channel": "news", "data": 1, "wait_for_ack": true, "ack_timeout": 120 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn scenarios_list_and_run() {
    let app = loopback_app(LoopbackTransport::new());
    let (_, list) = send(&app, "GET", "/live/scenarios", None).await;
    let ids: Vec<&str> = list.as_array().unwrap().iter().filter_map(|s| s["id"].as_str()).collect();
    assert_eq!(ids, vec!["basic-echo", "ack-roundtrip", "notification", "broadcast"]);

    let (status, report) = send(&app, "POST", "/live/scenarios/basic-echo/run", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["observed"], true);
    assert_eq!(report["events"][0]["type"], "connected");

    let (_, overview) = send(&app, "GET", "/telemetry/overview", None).await;
    assert_eq!(overview["total"], 1);
    let (_, page) = send(&app, "GET", "/telemetry/publishes?channel=test:channel", None).await;
    assert_eq!(page["publishes"][0]["message_id"], report["message_id"]);

    let (status, json) = send(&app, "POST", "/live/scenarios/nope/run", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "unknown scenario: nope");
}

#[tokio::test]
async fn unsubscribe_and_manual_ack() {
    let app = loopback_app(LoopbackTransport::new());
    send(&app, "POST", "/live/connect", None).await;
    send(&app, "POST", "/live/subscribe", Some(json!({ "channel": "a" }))).await;

    let (_, json) = send(&app, "POST", "/live/unsubscribe", Some(json!({ "channel": "missing" }))).await;
    assert_eq!(json["unsubscribed"], false);
    let (_, json) = send(&app, "POST", "/live/unsubscribe-all", None).await;
    assert_eq!(json["unsubscribed"], 1);

    let (status, json) = send(
        &app,
        "POST",
        "/live/ack",
        Some(json!({ "message_id": "not-pending", "client_id": "me" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["resolved"], false);
}

#[tokio::test]
async fn events_export_and_clear() {
    let app = loopback_app(LoopbackTransport::new());
    send(&app, "POST", "/live/connect", None).await;
    send(&app, "POST", "/live/subscribe", Some(json!({ "channel": "a" }))).await;

    let (_, events) = send(&app, "GET", "/live/events", None).await;
    assert_eq!(events.as_array().unwrap().len(), 2);

    let res = app
        .clone()
        .oneshot(Request::builder().uri("/live/events/export").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers()["content-type"].to_str().unwrap().starts_with("text/plain"));
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].contains("SUBSCRIBED [a]: Subscribed to a"));

    let (status, _) = send(&app, "DELETE", "/live/events", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, events) = send(&app, "GET", "/live/events", None).await;
    assert!(events.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn admin_without_redis_is_unavailable() {
    let app = loopback_app(LoopbackTransport::new());
    let (status, _) = send(&app, "GET", "/admin/channels", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn redis_admin_lists_published_channels() {
    let redis_url = match std::env::var("TEST_REDIS_URL") {
        Ok(u) => u,
        Err(_) => {
            eprintln!("Skip integration test: set TEST_REDIS_URL");
            return;
        }
    };
    let repo = match RedisRepository::new(&redis_url) {
        Ok(r) => Arc::new(r),
        Err(e) => {
            eprintln!("Skip integration test: {}", e);
            return;
        }
    };
    let channel = format!("it:{}", uuid::Uuid::new_v4());
    let payload = json!({ "type": "publication", "channel": channel, "data": { "n": 1 } }).to_string();
    if let Err(e) = repo.publish(&channel, &payload).await {
        eprintln!("Skip integration test: {}", e);
        return;
    }

    let admin = RedisAdmin::new(repo);
    let channels = admin.list_channels(Some("it:*")).await.unwrap();
    assert!(channels.channels.contains(&channel));
    let history = admin.channel_history(&channel).await.unwrap();
    assert_eq!(history.publications[0].data, json!({ "n": 1 }));
}
