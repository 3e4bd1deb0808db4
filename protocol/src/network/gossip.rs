//! # Gossip Distribution
//!
//! Every action a peer takes on the ledger is announced as an [`Envelope`]
//! on the single topic [`PUBSUB_TOPIC`]. Every peer, the publisher
//! included, runs [`GossipService::run`], which decodes each message and
//! dispatches it to the admission pipeline.
//!
//! ## Wire format
//!
//! Envelopes are bincode with fixed-width integers. The enum variant index
//! is the type tag, written first as a little-endian `u32`:
//!
//! | Tag | Variant            | Payload        |
//! |-----|--------------------|----------------|
//! | 0   | `SendTransaction`  | `Transaction`  |
//! | 1   | `CreateContract`   | `Transaction`  |
//! | 2   | `UpdatePeer`       | `UpdatePeer`   |
//!
//! Variant order is therefore part of the protocol.
//!
//! ## Failure handling
//!
//! Publishing is fire-and-forget. On the receive side a bad message is
//! logged and counted, then the loop moves on; nothing short of shutdown
//! or a closed transport ends it. Redeliveries, including a peer's own
//! publishes coming back, are rejected by the ledger as duplicates and
//! logged at debug level.

use std::sync::Arc;

use bincode::Options;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use super::transport::{Transport, TransportError};
use crate::admission::{Admission, AdmissionError, AdmissionKind, AdmissionPipeline};
use crate::config::{MAX_ENVELOPE_BYTES, PUBSUB_TOPIC};
use crate::ledger::Rejection;
use crate::transaction::{Transaction, TxId};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Peer metadata announcement. Carried and logged; peers attach no
/// behaviour to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePeer {
    pub user_handle: Vec<u8>,
}

/// The gossip wire wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Envelope {
    SendTransaction(Transaction),
    CreateContract(Transaction),
    UpdatePeer(UpdatePeer),
}

/// The envelope type tag, with its wire value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EnvelopeKind {
    SendTransaction = 0,
    CreateContract = 1,
    UpdatePeer = 2,
}

impl EnvelopeKind {
    pub fn tag(self) -> u32 {
        self as u32
    }
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_ENVELOPE_BYTES)
}

impl Envelope {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Self::SendTransaction(_) => EnvelopeKind::SendTransaction,
            Self::CreateContract(_) => EnvelopeKind::CreateContract,
            Self::UpdatePeer(_) => EnvelopeKind::UpdatePeer,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, GossipError> {
        wire_options()
            .serialize(self)
            .map_err(|e| GossipError::Encode(e.to_string()))
    }

    /// Decode an envelope. Oversized input fails without being parsed.
    pub fn decode(bytes: &[u8]) -> Result<Self, GossipError> {
        if bytes.len() as u64 > MAX_ENVELOPE_BYTES {
            return Err(GossipError::TooLarge { size: bytes.len() });
        }
        wire_options()
            .deserialize(bytes)
            .map_err(|e| GossipError::Decode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum GossipError {
    #[error("envelope encoding failed: {0}")]
    Encode(String),

    #[error("envelope decoding failed: {0}")]
    Decode(String),

    #[error("envelope of {size} bytes exceeds limit")]
    TooLarge { size: usize },

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl GossipError {
    /// Whether this is a malformed-message failure.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::TooLarge { .. })
    }
}

/// What the receive side did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Admitted { id: TxId, kind: AdmissionKind },
    /// Already in the ledger. Expected for loopback and redelivery.
    Duplicate { id: TxId },
    Rejected { id: TxId, reason: Rejection },
    PeerUpdate { user_handle: Vec<u8> },
}

// ---------------------------------------------------------------------------
// GossipService
// ---------------------------------------------------------------------------

/// Publishes envelopes and runs the receive loop for one peer.
pub struct GossipService {
    transport: Arc<dyn Transport>,
    pipeline: AdmissionPipeline,
    topic: String,
}

impl GossipService {
    pub fn new(transport: Arc<dyn Transport>, pipeline: AdmissionPipeline) -> Self {
        Self {
            transport,
            pipeline,
            topic: PUBSUB_TOPIC.to_string(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Encode and publish. Returns once the transport has taken the bytes.
    pub async fn publish(&self, envelope: &Envelope) -> Result<(), GossipError> {
        let bytes = envelope.encode()?;
        let size = bytes.len();
        self.transport.publish(&self.topic, bytes).await?;
        self.pipeline
            .context()
            .metrics
            .envelopes_published_total
            .inc();
        debug!(kind = ?envelope.kind(), size, "envelope published");
        Ok(())
    }

    /// Decode one message and route it.
    pub async fn handle_message(&self, data: &[u8]) -> Result<Dispatch, GossipError> {
        let envelope = Envelope::decode(data).map_err(|err| {
            self.pipeline
                .context()
                .metrics
                .gossip_decode_errors_total
                .inc();
            err
        })?;

        let (tx, kind) = match envelope {
            Envelope::SendTransaction(tx) => (tx, AdmissionKind::Transfer),
            Envelope::CreateContract(tx) => (tx, AdmissionKind::ContractCreation),
            Envelope::UpdatePeer(update) => {
                info!(handle = %String::from_utf8_lossy(&update.user_handle), "peer update received");
                return Ok(Dispatch::PeerUpdate {
                    user_handle: update.user_handle,
                });
            }
        };

        match self.pipeline.admit(tx, kind).await? {
            Admission::Admitted(admitted) => Ok(Dispatch::Admitted {
                id: admitted.id,
                kind,
            }),
            Admission::Rejected {
                id,
                reason: Rejection::Duplicate,
            } => Ok(Dispatch::Duplicate { id }),
            Admission::Rejected { id, reason } => Ok(Dispatch::Rejected { id, reason }),
        }
    }

    /// The receive loop. Returns when `shutdown` flips to `true` (or its
    /// sender is dropped) or when the transport closes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(topic = %self.topic, "gossip receive loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                inbound = self.transport.next_message() => {
                    let message = match inbound {
                        Ok(message) => message,
                        Err(TransportError::Closed) => {
                            info!("transport closed");
                            break;
                        }
                        Err(err) => {
                            warn!(error = %err, "transport receive failed");
                            continue;
                        }
                    };
                    if message.topic != self.topic {
                        trace!(topic = %message.topic, "ignoring message on foreign topic");
                        continue;
                    }
                    self.process(message.source.as_deref(), &message.data).await;
                }
            }
        }
        info!("gossip receive loop stopped");
    }

    async fn process(&self, source: Option<&str>, data: &[u8]) {
        let source = source.unwrap_or("unknown");
        match self.handle_message(data).await {
            Ok(Dispatch::Admitted { id, kind }) => {
                trace!(peer = source, id = %id.short(), kind = ?kind, "gossip admitted");
            }
            Ok(Dispatch::Duplicate { id }) => {
                debug!(peer = source, id = %id.short(), "duplicate delivery ignored");
            }
            Ok(Dispatch::Rejected { id, reason }) => {
                warn!(peer = source, id = %id.short(), reason = %reason, "gossiped transaction rejected");
            }
            Ok(Dispatch::PeerUpdate { .. }) => {}
            Err(err) if err.is_decode() => {
                warn!(peer = source, size = data.len(), error = %err, "dropping undecodable message");
            }
            Err(err) => {
                warn!(peer = source, error = %err, "gossip handler failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
