//! Publish/subscribe substrate used to bridge session traffic between
//! server instances.
//!
//! A client's SSE stream is held by exactly one instance, but its POSTs may
//! land on any instance behind the load balancer. The instance holding the
//! stream subscribes to the session's channel; any instance may publish to it.
//! Delivery is FIFO per channel and at-most-once: a subscriber that is not
//! connected when a message is published never sees it.

pub mod local;
#[cfg(feature = "redis")]
pub mod redis;

pub use local::LocalBus;
#[cfg(feature = "redis")]
pub use self::redis::RedisBus;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::session::SessionId;

/// Lazy stream of raw messages published on one channel
pub type MessageStream = BoxStream<'static, String>;

/// Errors raised by a bus backend
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus connection failed: {0}")]
    Connection(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),
}

/// Abstract publish/subscribe primitive
#[async_trait::async_trait]
pub trait SessionBus: Send + Sync {
    /// Publish a message, returning how many subscribers received it
    async fn publish(&self, channel: &str, message: String) -> Result<usize, BusError>;

    /// Subscribe to a channel. Each call starts a fresh subscription.
    async fn subscribe(&self, channel: &str) -> Result<MessageStream, BusError>;

    /// Short backend name for logs
    fn backend(&self) -> &'static str;
}

/// Message exchanged on a session channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    /// A serialized protocol frame to push down the session's stream
    Frame { payload: String },
    /// Presence check; subscribers ignore it, the receiver count is the answer
    Probe,
    /// Tear the session down on the instance holding it
    Close,
}

/// Channel name for a session
pub fn session_channel(id: &SessionId) -> String {
    format!("mcpgate:session:{}", id)
}
