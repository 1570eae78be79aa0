//! Live harness routes: connection, subscriptions, publish/ack, scenarios, event log.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use validator::Validate;

use crate::error::AppResult;
use crate::handlers::http::AppState;
use crate::harness::{HarnessSnapshot, PublishOptions, PublishReceipt, ScenarioInfo, ScenarioReport};
use crate::models::event::EventLogEntry;
use crate::models::subscription::Subscription;

#[derive(Debug, Deserialize, Validate)]
pub struct ChannelRequest {
    #[validate(length(min = 1, max = 255))]
    pub channel: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PublishRequest {
    #[validate(length(min = 1, max = 255))]
    pub channel: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub wait_for_ack: bool,
    /// Seconds.
    #[validate(range(min = 1, max = 60))]
    pub ack_timeout: Option<u64>,
    pub client_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AckRequest {
    #[validate(length(min = 1))]
    pub message_id: String,
    #[validate(length(min = 1))]
    pub client_id: String,
}

/// POST /live/connect
pub async fn connect(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let conn = state.harness().connect().await?;
    Ok(Json(json!({ "state": conn })))
}

/// POST /live/disconnect
pub async fn disconnect(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.harness().disconnect().await;
    Json(json!({ "state": state.harness().state().await }))
}

/// GET /live/state
pub async fn get_state(State(state): State<AppState>) -> Json<HarnessSnapshot> {
    Json(state.harness().snapshot().await)
}

/// POST /live/subscribe
pub async fn subscribe(
    State(state): State<AppState>,
    Json(body): Json<ChannelRequest>,
) -> AppResult<Json<Subscription>> {
    body.validate()?;
    Ok(Json(state.harness().subscribe(&body.channel).await?))
}

/// POST /live/unsubscribe
pub async fn unsubscribe(
    State(state): State<AppState>,
    Json(body): Json<ChannelRequest>,
) -> AppResult<Json<serde_json::Value>> {
    body.validate()?;
    let removed = state.harness().unsubscribe(&body.channel).await;
    Ok(Json(json!({ "channel": body.channel, "unsubscribed": removed })))
}

/// POST /live/unsubscribe-all
pub async fn unsubscribe_all(State(state): State<AppState>) -> Json<serde_json::Value> {
    let count = state.harness().unsubscribe_all().await;
    Json(json!({ "unsubscribed": count }))
}

/// POST /live/publish: suspends until the ack settles when `wait_for_ack` is set.
pub async fn publish(
    State(state): State<AppState>,
    Json(body): Json<PublishRequest>,
) -> AppResult<Json<PublishReceipt>> {
    body.validate()?;
    let opts = PublishOptions {
        wait_for_ack: body.wait_for_ack,
        ack_timeout: body.ack_timeout.map(Duration::from_secs),
        client_id: body.client_id,
    };
    let receipt = state
        .publisher()
        .publish(&body.channel, body.data, opts)
        .await?;
    Ok(Json(receipt))
}

/// POST /live/ack
pub async fn ack(
    State(state): State<AppState>,
    Json(body): Json<AckRequest>,
) -> AppResult<Json<serde_json::Value>> {
    body.validate()?;
    let resolved = state
        .harness()
        .send_ack(&body.message_id, &body.client_id)
        .await;
    Ok(Json(json!({ "message_id": body.message_id, "resolved": resolved })))
}

/// GET /live/scenarios
pub async fn list_scenarios(State(state): State<AppState>) -> Json<Vec<ScenarioInfo>> {
    Json(state.harness().scenarios())
}

/// POST /live/scenarios/:id/run
pub async fn run_scenario(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ScenarioReport>> {
    Ok(Json(state.publisher().run_scenario(&id).await?))
}

/// GET /live/events
pub async fn list_events(State(state): State<AppState>) -> Json<Vec<EventLogEntry>> {
    Json(state.harness().events().await)
}

/// DELETE /live/events
pub async fn clear_events(State(state): State<AppState>) -> StatusCode {
    state.harness().clear_events().await;
    StatusCode::NO_CONTENT
}

/// GET /live/events/export: plain-text log, one entry per line.
pub async fn export_events(State(state): State<AppState>) -> impl IntoResponse {
    let text = state.harness().export_events().await;
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        text,
    )
}
