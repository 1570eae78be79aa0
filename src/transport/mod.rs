//! Transports connecting the harness to a real-time broker.
//!
//! The harness only depends on the narrow [`Transport`] interface: open a
//! connection and receive classified inbound frames, send outbound frames, close.

pub mod loopback;
pub mod redis_pubsub;

pub use self::loopback::LoopbackTransport;
pub use self::redis_pubsub::RedisTransport;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::HarnessResult;
use crate::models::frame::{OutboundFrame, TransportEvent};

/// Connection to a real-time broker.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open the connection. Resolves once the transport is open or has failed.
    async fn open(&self) -> HarnessResult<mpsc::UnboundedReceiver<TransportEvent>>;

    /// Send one frame over the open connection.
    async fn send(&self, frame: OutboundFrame) -> HarnessResult<()>;

    /// Close the connection. Closing an already-closed transport does nothing.
    async fn close(&self);

    /// Short name for logs.
    fn name(&self) -> &'static str;
}
