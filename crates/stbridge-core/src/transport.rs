// ── Pub/sub transport seam ──
//
// The core publishes canonical fields and subscribes to command topics
// through `Transport`. Inbound messages arrive on an `mpsc` channel the
// adapter owns the sending half of.

use futures_util::future::BoxFuture;
use thiserror::Error;

/// Capacity of the inbound command channel.
pub const INBOUND_CHANNEL_SIZE: usize = 64;

/// Failure reported by a transport adapter.
#[derive(Debug, Clone, Error)]
#[error("Transport error: {message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: String,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Outbound half of the bus.
pub trait Transport: Send + Sync {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        payload: &'a str,
        retained: bool,
    ) -> BoxFuture<'a, Result<(), TransportError>>;

    fn subscribe<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, Result<(), TransportError>>;
}
