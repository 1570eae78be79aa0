//! Entry point: load config, wire the harness and its stores, and run the server.

use livewire::config::{Config, TransportKind};
use livewire::db;
use livewire::repositories::RedisRepository;
use livewire::services::{
    AdminQuery, MemoryTelemetryStore, PgTelemetryStore, PublishTelemetry, RedisAdmin,
};
use livewire::transport::{LoopbackTransport, RedisTransport, Transport};
use livewire::{create_app, AppState, LiveHarness};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("config: {}", e))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let telemetry: Arc<dyn PublishTelemetry> = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url).await?;
            db::ensure_schema(&pool).await?;
            tracing::info!("publish telemetry stored in postgres");
            Arc::new(PgTelemetryStore::new(pool))
        }
        None => {
            tracing::info!("DATABASE_URL unset, publish telemetry kept in memory");
            Arc::new(MemoryTelemetryStore::new())
        }
    };

    let (transport, admin) = match config.transport {
        TransportKind::Redis => {
            let repo = Arc::new(RedisRepository::new(&config.redis_url)?);
            let transport: Arc<dyn Transport> =
                Arc::new(RedisTransport::new(repo.clone(), config.client_id.clone()));
            let admin: Arc<dyn AdminQuery> = Arc::new(RedisAdmin::new(repo));
            (transport, Some(admin))
        }
        TransportKind::Loopback => {
            let transport: Arc<dyn Transport> = Arc::new(LoopbackTransport::new());
            (transport, None)
        }
    };

    let harness = LiveHarness::new(transport, config.harness_config());
    let state = AppState::new(harness, telemetry, admin);
    let app = create_app(state);

    tracing::info!(addr = %config.server_addr, transport = ?config.transport, "listening");
    let listener = tokio::net::TcpListener::bind(config.server_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
