//! Dashboard HTTP handlers: publish telemetry and broker admin queries.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::error::AppError;
use crate::handlers::http::AppState;
use crate::models::presence::{ChannelsResponse, HistoryResponse, PresenceResponse};
use crate::models::telemetry::{ChannelTimeline, PublishOverview, PublishPage, PublishQuery};

// ---- Telemetry ----

/// GET /telemetry/publishes?channel&status&offset&count
pub async fn list_publishes(
    State(state): State<AppState>,
    Query(query): Query<PublishQuery>,
) -> Result<Json<PublishPage>, AppError> {
    Ok(Json(state.telemetry().list_publishes(&query).await?))
}

/// GET /telemetry/overview
pub async fn overview(State(state): State<AppState>) -> Result<Json<PublishOverview>, AppError> {
    Ok(Json(state.telemetry().overview().await?))
}

/// GET /telemetry/channels
pub async fn channel_timeline(
    State(state): State<AppState>,
) -> Result<Json<ChannelTimeline>, AppError> {
    Ok(Json(state.telemetry().channel_timeline().await?))
}

// ---- Admin ----

#[derive(Debug, Deserialize)]
pub struct ChannelsQuery {
    pub pattern: Option<String>,
}

/// GET /admin/channels?pattern
pub async fn list_channels(
    State(state): State<AppState>,
    Query(query): Query<ChannelsQuery>,
) -> Result<Json<ChannelsResponse>, AppError> {
    let pattern = query.pattern.as_deref().filter(|p| !p.is_empty());
    Ok(Json(state.admin()?.list_channels(pattern).await?))
}

/// GET /admin/channels/:channel/history
pub async fn channel_history(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    Ok(Json(state.admin()?.channel_history(&channel).await?))
}

/// GET /admin/channels/:channel/presence
pub async fn channel_presence(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Result<Json<PresenceResponse>, AppError> {
    Ok(Json(state.admin()?.presence(&channel).await?))
}
