//! # Transaction Module
//!
//! Construction, signing, stamping, and verification of Spore
//! transactions. Every value transfer, contract deployment, and contract
//! call is represented as a [`Transaction`].
//!
//! ## Architecture
//!
//! ```text
//! types.rs        : TxId, the 32-byte transaction identifier
//! builder.rs      : Transaction, its canonical encoding, TransactionBuilder
//! signing.rs      : secp256k1 recoverable signing
//! verification.rs : signature recovery and stamp checks
//! ```
//!
//! ## Lifecycle
//!
//! 1. **Build** with [`TransactionBuilder`].
//! 2. **Sign** with [`sign_transaction`]; the client does this.
//! 3. **Stamp** with [`Transaction::stamp`]; the first peer to admit it does this.
//! 4. **Verify** with [`verify_signature`] (and [`verify_stamp`] for gossip).

pub mod builder;
pub mod signing;
pub mod types;
pub mod verification;

pub use builder::{Transaction, TransactionBuilder};
pub use signing::sign_transaction;
pub use types::{ParseTxIdError, TxId};
pub use verification::{verify_signature, verify_stamp, TransactionError};
