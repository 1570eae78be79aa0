//! Services around the harness: publish recording, telemetry, and admin queries.

pub mod admin;
pub mod publish;
pub mod telemetry;

pub use admin::{AdminQuery, RedisAdmin};
pub use publish::PublishService;
pub use telemetry::{MemoryTelemetryStore, PgTelemetryStore, PublishTelemetry};
