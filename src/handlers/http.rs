//! Shared state and the health probe.

use axum::{http::StatusCode, Json};
use serde_json::json;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::harness::LiveHarness;
use crate::services::{AdminQuery, PublishService, PublishTelemetry};

/// Shared application state for the live, telemetry and admin routes.
#[derive(Clone)]
pub struct AppState {
    pub harness: LiveHarness,
    pub publisher: PublishService,
    pub telemetry: Arc<dyn PublishTelemetry>,
    /// Present only when a Redis broker backs the harness.
    pub admin: Option<Arc<dyn AdminQuery>>,
}

impl AppState {
    pub fn new(
        harness: LiveHarness,
        telemetry: Arc<dyn PublishTelemetry>,
        admin: Option<Arc<dyn AdminQuery>>,
    ) -> Self {
        let publisher = PublishService::new(harness.clone(), telemetry.clone());
        Self {
            harness,
            publisher,
            telemetry,
            admin,
        }
    }

    pub fn harness(&self) -> &LiveHarness {
        &self.harness
    }

    pub fn publisher(&self) -> &PublishService {
        &self.publisher
    }

    pub fn telemetry(&self) -> &dyn PublishTelemetry {
        self.telemetry.as_ref()
    }

    pub fn admin(&self) -> AppResult<&dyn AdminQuery> {
        self.admin.as_deref().ok_or_else(|| {
            AppError::Unavailable("admin queries need the redis transport".to_string())
        })
    }
}

/// GET /health: liveness probe.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "service": "livewire" })),
    )
}
