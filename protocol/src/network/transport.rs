//! # Pub/Sub Transport
//!
//! The gossip layer talks to the network through [`Transport`]: publish
//! bytes on a topic, pull the next inbound message. Delivery is best
//! effort. There are no acknowledgements and no retries.
//!
//! [`MemoryHub`] is an in-process implementation over a tokio broadcast
//! channel. Every connected [`MemoryTransport`] receives every message,
//! its own publishes included, which matches how a gossipsub mesh with
//! local loopback behaves. The node binary plugs in a libp2p transport
//! instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::warn;

/// Errors surfaced by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport is shut down. No further messages will arrive.
    #[error("transport closed")]
    Closed,

    #[error("publish failed: {0}")]
    Publish(String),
}

/// A message pulled off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    /// Originating peer, when the transport knows it.
    pub source: Option<String>,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Hand `data` to the network on `topic`. Fire-and-forget.
    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), TransportError>;

    /// Wait for the next inbound message. Must be cancel-safe.
    async fn next_message(&self) -> Result<InboundMessage, TransportError>;
}

// ---------------------------------------------------------------------------
// MemoryHub
// ---------------------------------------------------------------------------

const DEFAULT_HUB_CAPACITY: usize = 1024;

/// An in-process pub/sub bus. Clone it to share; connect peers with
/// [`MemoryHub::connect`].
#[derive(Clone)]
pub struct MemoryHub {
    sender: broadcast::Sender<InboundMessage>,
}

impl MemoryHub {
    /// `capacity` bounds how far a slow subscriber may fall behind before
    /// it starts losing messages.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Attach a new peer to the bus.
    pub fn connect(&self, name: impl Into<String>) -> MemoryTransport {
        MemoryTransport {
            name: name.into(),
            sender: self.sender.clone(),
            receiver: Mutex::new(self.sender.subscribe()),
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Deliver raw bytes to every peer as if some outside peer sent them.
    pub fn inject(&self, topic: &str, data: Vec<u8>) {
        let _ = self.sender.send(InboundMessage {
            topic: topic.to_string(),
            source: None,
            data,
        });
    }

    pub fn peer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new(DEFAULT_HUB_CAPACITY)
    }
}

/// One peer's connection to a [`MemoryHub`].
pub struct MemoryTransport {
    name: String,
    sender: broadcast::Sender<InboundMessage>,
    receiver: Mutex<broadcast::Receiver<InboundMessage>>,
    published: Arc<AtomicU64>,
}

impl MemoryTransport {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How many times `publish` has been called on this transport.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    /// A shared view of the publish counter that outlives moving the
    /// transport into an `Arc<dyn Transport>`.
    pub fn publish_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.published)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), TransportError> {
        self.published.fetch_add(1, Ordering::SeqCst);
        // A send error only means nobody is listening, which a real mesh
        // would not report either.
        let _ = self.sender.send(InboundMessage {
            topic: topic.to_string(),
            source: Some(self.name.clone()),
            data,
        });
        Ok(())
    }

    async fn next_message(&self) -> Result<InboundMessage, TransportError> {
        let mut receiver = self.receiver.lock().await;
        loop {
            match receiver.recv().await {
                Ok(message) => return Ok(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(peer = %self.name, skipped, "memory transport lagged, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(TransportError::Closed),
            }
        }
    }
}
