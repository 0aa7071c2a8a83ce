//! Broadcast channel adapter: best-effort, unordered, no persistence.
//!
//! A subscriber that joins after a publish never sees it, and delivery is
//! at-most-once, so a bus message is never the sole carrier of state — the
//! state store always backs it.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{self, BoxFuture};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

/// Topic carrying the launch-sync protocol (probes, responses, commits).
pub const LAUNCH_SYNC_TOPIC: &str = "launch-sync-control-v1";

/// Per-topic channel capacity; lagging subscribers drop messages.
const TOPIC_CAPACITY: usize = 64;

/// Result alias for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Error raised when a publish cannot be attempted.
#[derive(Debug, Error)]
pub enum BusError {
    /// The payload could not be serialised.
    #[error("bus payload serialisation failed: {0}")]
    Serialisation(#[from] serde_json::Error),
    /// The underlying transport refused the message.
    #[error("bus unavailable: {0}")]
    Unavailable(String),
}

/// Event envelope carried across the bus.
#[derive(Debug, Clone)]
pub struct BusEnvelope {
    /// Topic the message was published on.
    pub topic: String,
    /// Event name used for dispatch.
    pub event: String,
    /// JSON payload.
    pub payload: serde_json::Value,
}

impl BusEnvelope {
    /// Serialise `payload` into an envelope for `topic`/`event`.
    pub fn json<T>(topic: &str, event: &str, payload: &T) -> BusResult<Self>
    where
        T: Serialize,
    {
        Ok(Self {
            topic: topic.to_owned(),
            event: event.to_owned(),
            payload: serde_json::to_value(payload)?,
        })
    }
}

/// Abstraction over the publish/subscribe transport.
pub trait BroadcastChannel: Send + Sync {
    /// Publish an envelope to everyone currently subscribed to its topic.
    fn publish(&self, envelope: BusEnvelope) -> BoxFuture<'static, BusResult<()>>;

    /// Subscribe to a topic; only messages published after this call arrive.
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusEnvelope>;
}

/// In-process bus over tokio broadcast channels, for tests and the simulator.
#[derive(Clone)]
pub struct MemoryBus {
    topics: Arc<DashMap<String, broadcast::Sender<BusEnvelope>>>,
}

impl MemoryBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<BusEnvelope> {
        self.topics
            .entry(topic.to_owned())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastChannel for MemoryBus {
    fn publish(&self, envelope: BusEnvelope) -> BoxFuture<'static, BusResult<()>> {
        let sender = self.sender(&envelope.topic);
        // No subscribers is not an error: at-most-once, best effort.
        let _ = sender.send(envelope);
        Box::pin(future::ready(Ok(())))
    }

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusEnvelope> {
        self.sender(topic).subscribe()
    }
}
