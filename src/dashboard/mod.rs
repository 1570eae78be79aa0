//! Dashboard routes: publish telemetry and broker admin views.

pub mod handlers;

pub use handlers::*;
