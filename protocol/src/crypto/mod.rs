//! # Cryptographic Primitives
//!
//! Thin, typed wrappers over audited implementations:
//!
//! - **secp256k1 ECDSA** (`k256`) with public-key recovery for signatures.
//! - **SHA-256** (`sha2`) for signing digests and transaction ids.
//! - **Keccak-256** (`tiny-keccak`) for address derivation.
//!
//! Nothing in here is clever, and it should stay that way.

pub mod hash;
pub(crate) mod hex_serde;
pub mod keys;

pub use hash::{keccak256, sha256};
pub use keys::{recover_address, Address, KeyError, RecoverableSignature, SporeKeypair};
