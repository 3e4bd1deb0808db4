//! # Protocol Configuration & Constants
//!
//! Every magic number in Spore lives here. Peers that disagree on any of
//! the values in the "wire" sections below will not understand each other,
//! so treat them as part of the protocol, not as tuning knobs.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full protocol version string.
pub const PROTOCOL_VERSION: &str = "1.0.0";

// ---------------------------------------------------------------------------
// Gossip & Persistence Names
// ---------------------------------------------------------------------------

/// The single gossip topic every peer subscribes to. The version suffix is
/// part of the name so incompatible protocol revisions never share a mesh.
pub const PUBSUB_TOPIC: &str = "/spore/1.0.0";

/// Storage namespace holding admitted transactions, keyed by transaction id.
pub const DATABASE_NAMESPACE: &str = "sporedb";

/// Upper bound on an inbound gossip payload. Anything larger is treated as
/// a decode failure without being deserialized.
pub const MAX_ENVELOPE_BYTES: u64 = 1024 * 1024;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Digest length for transaction ids and signing digests (SHA-256).
pub const HASH_LENGTH: usize = 32;

/// Account address length: the right-most 20 bytes of the Keccak-256 hash
/// of the uncompressed secp256k1 public key.
pub const ADDRESS_LENGTH: usize = 20;

/// Recoverable ECDSA signature length: `r (32) || s (32) || v (1)`.
pub const SIGNATURE_LENGTH: usize = 65;

/// secp256k1 secret key length.
pub const SECRET_KEY_LENGTH: usize = 32;

/// Contract identifiers are full 32-byte hashes. A transaction whose `to`
/// field has this length targets a contract instead of an account.
pub const CONTRACT_ID_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Ledger Graph
// ---------------------------------------------------------------------------

/// Default ordering width `k`: the maximum number of ready nodes the
/// ordering pass releases per round. All peers must use the same value to
/// produce identical orderings.
pub const DEFAULT_ORDERING_WIDTH: usize = 1621;

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Attempts made by a background persistence task before it gives up and
/// reports the failure.
pub const PERSIST_MAX_ATTEMPTS: u32 = 3;

/// Delay between persistence attempts. Doubles after each failure.
pub const PERSIST_RETRY_BACKOFF: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default port for the JSON-RPC / REST API.
pub const DEFAULT_RPC_PORT: u16 = 7545;

/// Default port for libp2p gossip.
pub const DEFAULT_P2P_PORT: u16 = 7546;

/// Default port for the Prometheus metrics endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 7547;

/// Capacity of the in-process event broadcast channel. Slow subscribers
/// that fall further behind than this lose events (and are told so).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_carries_protocol_version() {
        assert!(PUBSUB_TOPIC.ends_with(PROTOCOL_VERSION));
    }

    #[test]
    fn contract_ids_and_addresses_are_distinguishable_by_length() {
        assert_ne!(CONTRACT_ID_LENGTH, ADDRESS_LENGTH);
        assert_eq!(SIGNATURE_LENGTH, 2 * HASH_LENGTH + 1);
    }
}
