//! Transaction verification: signature recovery and stamp checks.
//!
//! Admission runs [`verify_signature`] on every transaction, local or
//! gossiped, before the ledger graph is touched. Gossiped transactions
//! arrive already stamped and additionally pass [`verify_stamp`], so a
//! peer cannot relay a transaction under a forged id.

use thiserror::Error;

use super::builder::Transaction;
use super::types::TxId;
use crate::crypto::keys::{recover_address, Address, KeyError};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur while encoding, signing, or verifying a transaction.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// The transaction carries no signature.
    #[error("transaction is unsigned")]
    MissingSignature,

    /// Wrong length, out-of-range scalar, or bad recovery byte.
    #[error("malformed signature: {reason}")]
    MalformedSignature { reason: String },

    /// The signature is well formed but no public key recovers from it.
    #[error("signature recovery failed")]
    SignatureRecovery,

    /// The recovered signer is not the claimed sender.
    #[error("sender mismatch: transaction claims {expected}, signature recovers {recovered}")]
    SenderMismatch { expected: Address, recovered: Address },

    /// A stamped transaction's id does not match its contents.
    #[error("transaction id mismatch: carried {carried}, computed {computed}")]
    IdMismatch { carried: TxId, computed: TxId },

    /// A gossiped transaction arrived without an id.
    #[error("transaction is not stamped")]
    Unstamped,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("encoding error: {0}")]
    Encoding(String),
}

impl From<KeyError> for TransactionError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::MalformedSignature(reason) => Self::MalformedSignature { reason },
            KeyError::RecoveryFailed => Self::SignatureRecovery,
            other => Self::MalformedSignature {
                reason: other.to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

/// Recover the signer of `tx` and require it to equal `tx.from`.
///
/// Returns the recovered address on success.
pub fn verify_signature(tx: &Transaction) -> Result<Address, TransactionError> {
    if !tx.is_signed() {
        return Err(TransactionError::MissingSignature);
    }

    let digest = tx.signing_digest()?;
    let recovered = recover_address(&digest, &tx.signature)?;

    if recovered != tx.from {
        return Err(TransactionError::SenderMismatch {
            expected: tx.from,
            recovered,
        });
    }
    Ok(recovered)
}

/// Require `tx` to be stamped with the id its contents hash to.
pub fn verify_stamp(tx: &Transaction) -> Result<TxId, TransactionError> {
    if !tx.is_stamped() {
        return Err(TransactionError::Unstamped);
    }
    let computed = tx.compute_id()?;
    if computed != tx.id {
        return Err(TransactionError::IdMismatch {
            carried: tx.id,
            computed,
        });
    }
    Ok(computed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
