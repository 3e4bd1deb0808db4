//! Transaction signing with secp256k1 recoverable signatures.
//!
//! Signing is a separate step from building because the keypair may not
//! be available at construction time (a wallet or a remote signer). The
//! signed bytes are [`Transaction::signing_digest`], which excludes the
//! signature itself and both stamp fields.

use super::builder::Transaction;
use super::verification::TransactionError;
use crate::crypto::keys::SporeKeypair;

/// Signs a transaction in place.
///
/// The caller is responsible for `tx.from` matching `keypair.address()`;
/// a mismatch is not caught here but every receiving peer will reject the
/// transaction during admission.
///
/// Returns the transaction for chaining.
pub fn sign_transaction<'a>(
    tx: &'a mut Transaction,
    keypair: &SporeKeypair,
) -> Result<&'a Transaction, TransactionError> {
    let digest = tx.signing_digest()?;
    let signature = keypair
        .sign_prehash(&digest)
        .map_err(|e| TransactionError::Signing(e.to_string()))?;
    tx.signature = signature.to_vec();
    Ok(tx)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SIGNATURE_LENGTH;
    use crate::transaction::builder::TransactionBuilder;

    #[test]
    fn signing_produces_65_byte_signature() {
        let kp = SporeKeypair::generate();
        let mut tx = TransactionBuilder::new().from(kp.address()).build();

        sign_transaction(&mut tx, &kp).unwrap();
        assert_eq!(tx.signature.len(), SIGNATURE_LENGTH);
    }

    #[test]
    fn resigning_replaces_signature_not_digest() {
        let kp = SporeKeypair::generate();
        let mut tx = TransactionBuilder::new()
            .from(kp.address())
            .data(vec![1, 2, 3])
            .build();

        sign_transaction(&mut tx, &kp).unwrap();
        let digest = tx.signing_digest().unwrap();
        sign_transaction(&mut tx, &kp).unwrap();

        // RFC 6979 signing is deterministic, and the digest ignores the old signature.
        assert_eq!(tx.signing_digest().unwrap(), digest);
        assert_eq!(tx.signature.len(), SIGNATURE_LENGTH);
    }
}
