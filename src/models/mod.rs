//! Data models for channels, log events, wire frames, subscriptions, presence and telemetry.

pub mod channel;
pub mod event;
pub mod frame;
pub mod presence;
pub mod subscription;
pub mod telemetry;

pub use channel::*;
pub use event::*;
pub use frame::*;
pub use presence::*;
pub use subscription::*;
pub use telemetry::*;
