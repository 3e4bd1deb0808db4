//! The [`Transaction`] type, its canonical encoding, stamping, and a
//! builder for constructing unsigned transactions.
//!
//! Three byte strings matter for a transaction and they differ only in
//! which fields are blanked before encoding:
//!
//! | Purpose         | `signature` | `id`    | `created` |
//! |-----------------|-------------|---------|-----------|
//! | signing digest  | cleared     | cleared | cleared   |
//! | transaction id  | kept        | cleared | cleared   |
//! | wire / storage  | kept        | kept    | kept      |
//!
//! `id` and `created` are derived by the admitting peer, so the sender
//! never signs them, and the id never depends on the wall clock.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::types::TxId;
use super::verification::TransactionError;
use crate::config::CONTRACT_ID_LENGTH;
use crate::contract::ContractId;
use crate::crypto::hash::sha256;
use crate::crypto::keys::Address;

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A Spore transaction.
///
/// Field order is the canonical encoding order (bincode follows declaration
/// order). `signature` is deliberately last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Opaque payload: contract bytecode for creations, call input otherwise.
    pub data: Vec<u8>,

    /// Unix timestamp (seconds) assigned when the transaction is stamped.
    /// Zero until then.
    pub created: i64,

    /// Derived identifier. [`TxId::UNSET`] until stamped.
    pub id: TxId,

    /// Recipient: a 20-byte account address, or a 32-byte contract id.
    pub to: Vec<u8>,

    /// Sender address. The signature must recover to exactly this value.
    pub from: Address,

    pub gas: i64,

    pub gas_price: i64,

    pub nonce: i32,

    /// Marks a contract deployment; `data` carries the code.
    pub is_contract_creation: bool,

    /// 65-byte recoverable signature over [`Transaction::signing_digest`].
    pub signature: Vec<u8>,
}

impl Transaction {
    /// Canonical binary encoding (bincode, declaration order).
    pub fn encode(&self) -> Result<Vec<u8>, TransactionError> {
        bincode::serialize(self).map_err(|e| TransactionError::Encoding(e.to_string()))
    }

    /// Decode a transaction from its canonical encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, TransactionError> {
        bincode::deserialize(bytes).map_err(|e| TransactionError::Encoding(e.to_string()))
    }

    /// SHA-256 of the encoding with `signature`, `id` and `created` cleared.
    /// This is what the sender signs.
    pub fn signing_digest(&self) -> Result<[u8; 32], TransactionError> {
        let mut unsigned = self.clone();
        unsigned.signature.clear();
        unsigned.id = TxId::UNSET;
        unsigned.created = 0;
        Ok(sha256(&unsigned.encode()?))
    }

    /// SHA-256 of the encoding with the signature present and `id`/`created`
    /// cleared. Stable across re-stamping and across peers.
    pub fn compute_id(&self) -> Result<TxId, TransactionError> {
        let mut unstamped = self.clone();
        unstamped.id = TxId::UNSET;
        unstamped.created = 0;
        Ok(TxId(sha256(&unstamped.encode()?)))
    }

    /// Assign the derived id, then the creation time.
    ///
    /// The id is computed first and without reference to `created`, so
    /// stamping the same signed transaction twice yields the same id.
    pub fn stamp(&mut self, created: i64) -> Result<TxId, TransactionError> {
        let id = self.compute_id()?;
        self.id = id;
        self.created = created;
        Ok(id)
    }

    /// [`Transaction::stamp`] with the current wall-clock time.
    pub fn stamp_now(&mut self) -> Result<TxId, TransactionError> {
        self.stamp(Utc::now().timestamp())
    }

    pub fn is_stamped(&self) -> bool {
        !self.id.is_unset()
    }

    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }

    /// The contract this transaction calls, if `to` is a contract id.
    pub fn contract_target(&self) -> Option<ContractId> {
        if self.to.len() != CONTRACT_ID_LENGTH {
            return None;
        }
        let mut id = [0u8; CONTRACT_ID_LENGTH];
        id.copy_from_slice(&self.to);
        Some(ContractId(id))
    }

    /// SHA-256 of the payload alone. Contract creation requests report this
    /// value back to the client instead of the transaction id.
    pub fn data_hash(&self) -> [u8; 32] {
        sha256(&self.data)
    }
}

// ---------------------------------------------------------------------------
// TransactionBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for unsigned, unstamped transactions.
///
/// ```
/// use spore_protocol::crypto::SporeKeypair;
/// use spore_protocol::transaction::{sign_transaction, TransactionBuilder};
///
/// let kp = SporeKeypair::generate();
/// let mut tx = TransactionBuilder::new()
///     .from(kp.address())
///     .to(vec![0x11; 20])
///     .data(b"hello".to_vec())
///     .nonce(1)
///     .build();
/// sign_transaction(&mut tx, &kp).unwrap();
/// assert!(tx.is_signed());
/// assert!(!tx.is_stamped());
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransactionBuilder {
    data: Vec<u8>,
    to: Vec<u8>,
    from: Address,
    gas: i64,
    gas_price: i64,
    nonce: i32,
    is_contract_creation: bool,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn to(mut self, to: Vec<u8>) -> Self {
        self.to = to;
        self
    }

    /// Target an existing contract.
    pub fn to_contract(mut self, contract: ContractId) -> Self {
        self.to = contract.0.to_vec();
        self
    }

    pub fn from(mut self, from: Address) -> Self {
        self.from = from;
        self
    }

    pub fn gas(mut self, gas: i64) -> Self {
        self.gas = gas;
        self
    }

    pub fn gas_price(mut self, gas_price: i64) -> Self {
        self.gas_price = gas_price;
        self
    }

    pub fn nonce(mut self, nonce: i32) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn contract_creation(mut self, flag: bool) -> Self {
        self.is_contract_creation = flag;
        self
    }

    pub fn build(self) -> Transaction {
        Transaction {
            data: self.data,
            created: 0,
            id: TxId::UNSET,
            to: self.to,
            from: self.from,
            gas: self.gas,
            gas_price: self.gas_price,
            nonce: self.nonce,
            is_contract_creation: self.is_contract_creation,
            signature: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::SporeKeypair;
    use crate::transaction::signing::sign_transaction;

    fn signed_tx() -> Transaction {
        let kp = SporeKeypair::generate();
        let mut tx = TransactionBuilder::new()
            .from(kp.address())
            .to(vec![0x22; 20])
            .data(b"payload".to_vec())
            .gas(21_000)
            .gas_price(3)
            .nonce(7)
            .build();
        sign_transaction(&mut tx, &kp).unwrap();
        tx
    }

    #[test]
    fn stamping_twice_yields_same_id() {
        let mut tx = signed_tx();
        let first = tx.stamp(1_000).unwrap();
        let second = tx.stamp(2_000).unwrap();

        assert_eq!(first, second);
        assert_eq!(tx.created, 2_000);
    }

    #[test]
    fn stamped_copies_agree_on_id() {
        let tx = signed_tx();
        let mut a = tx.clone();
        let mut b = tx;
        a.stamp(5).unwrap();
        b.stamp_now().unwrap();
        assert_eq!(a.id, b.id);
        assert!(a.is_stamped());
    }

    #[test]
    fn id_covers_signature() {
        let tx = signed_tx();
        let mut tampered = tx.clone();
        tampered.signature[0] ^= 0x01;
        assert_ne!(tx.compute_id().unwrap(), tampered.compute_id().unwrap());
    }

    #[test]
    fn signing_digest_ignores_stamp_fields() {
        let mut tx = signed_tx();
        let before = tx.signing_digest().unwrap();
        tx.stamp(99).unwrap();
        assert_eq!(tx.signing_digest().unwrap(), before);
    }

    #[test]
    fn encoding_round_trips() {
        let mut tx = signed_tx();
        tx.stamp(42).unwrap();
        let decoded = Transaction::decode(&tx.encode().unwrap()).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn contract_target_requires_32_bytes() {
        let tx = TransactionBuilder::new().to(vec![1u8; 20]).build();
        assert!(tx.contract_target().is_none());

        let tx = TransactionBuilder::new().to_contract(ContractId([9u8; 32])).build();
        assert_eq!(tx.contract_target(), Some(ContractId([9u8; 32])));
    }

    #[test]
    fn data_hash_differs_from_id() {
        let mut tx = signed_tx();
        let id = tx.stamp(1).unwrap();
        assert_ne!(id.0, tx.data_hash());
        assert_eq!(tx.data_hash(), sha256(b"payload"));
    }
}
