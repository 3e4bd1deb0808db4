//! # Hashing Utilities
//!
//! Two hash functions, two jobs:
//!
//! - **SHA-256**: transaction signing digests and transaction ids. Every
//!   peer recomputes these, so the choice is part of the protocol.
//! - **Keccak-256**: address derivation only. Addresses are the right-most
//!   20 bytes of the Keccak-256 hash of the uncompressed public key, which
//!   keeps them compatible with Ethereum-style wallets.

use sha2::{Digest, Sha256};
use tiny_keccak::{Hasher, Keccak};

/// Compute the SHA-256 digest of `data`.
///
/// # Example
///
/// ```
/// use spore_protocol::crypto::sha256;
///
/// let hash = sha256(b"spore");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the Keccak-256 digest of `data` (the pre-standard SHA-3 variant
/// Ethereum uses, not NIST SHA3-256).
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut keccak = Keccak::v256();
    let mut out = [0u8; 32];
    keccak.update(data);
    keccak.finalize(&mut out);
    out
}
