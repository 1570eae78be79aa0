//! Database layer: pool and publish telemetry queries for PostgreSQL.

mod pool;
mod repositories;

pub use pool::{create_pool, ensure_schema, DbPool};
pub use repositories::*;
