//! Real-time pub/sub live testing harness.
//!
//! Hosts one logical broker connection, tracks its subscriptions and
//! publish acknowledgments, and exposes the event log, canned scenarios,
//! publish telemetry and broker admin queries over HTTP and WebSocket.

pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod handlers;
pub mod harness;
pub mod models;
pub mod repositories;
pub mod services;
pub mod transport;

pub use config::Config;
pub use error::{AppError, HarnessError};
pub use handlers::http::AppState;
pub use harness::{HarnessConfig, LiveHarness};
pub use services::PublishService;

use axum::routing::{get, post};
use handlers::{http, live};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the API router (health, live harness, telemetry, admin). Used by main and by integration tests.
pub fn create_app(state: AppState) -> axum::Router {
    let live_routes = axum::Router::new()
        .route("/connect", post(live::connect))
        .route("/disconnect", post(live::disconnect))
        .route("/state", get(live::get_state))
        .route("/subscribe", post(live::subscribe))
        .route("/unsubscribe", post(live::unsubscribe))
        .route("/unsubscribe-all", post(live::unsubscribe_all))
        .route("/publish", post(live::publish))
        .route("/ack", post(live::ack))
        .route("/scenarios", get(live::list_scenarios))
        .route("/scenarios/:id/run", post(live::run_scenario))
        .route(
            "/events",
            get(live::list_events).delete(live::clear_events),
        )
        .route("/events/export", get(live::export_events))
        .route("/events/ws", get(handlers::events_ws));

    let telemetry_routes = axum::Router::new()
        .route("/publishes", get(dashboard::list_publishes))
        .route("/overview", get(dashboard::overview))
        .route("/channels", get(dashboard::channel_timeline));

    let admin_routes = axum::Router::new()
        .route("/channels", get(dashboard::list_channels))
        .route("/channels/:channel/history", get(dashboard::channel_history))
        .route("/channels/:channel/presence", get(dashboard::channel_presence));

    axum::Router::new()
        .route("/health", get(http::health))
        .nest("/live", live_routes)
        .nest("/telemetry", telemetry_routes)
        .nest("/admin", admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
