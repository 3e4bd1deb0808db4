//! # SporeDB: Persistent Storage Engine
//!
//! The persistence collaborator for Spore peers, built on sled's embedded
//! key-value store.
//!
//! ## Tree Layout
//!
//! Every namespace is its own sled tree. The node itself writes to exactly
//! one:
//!
//! | Tree (namespace) | Key               | Value                  |
//! |------------------|-------------------|------------------------|
//! | `sporedb`        | `tx_id` (32 B)    | `bincode(Transaction)` |
//!
//! Transactions are written after they join the ledger graph and are never
//! deleted or rewritten with different contents, so there is no batching
//! or cross-tree atomicity to worry about.

use std::path::Path;

use sled::{Db, Tree};

use crate::config::DATABASE_NAMESPACE;
use crate::transaction::{Transaction, TxId};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("key not found: {namespace}/{key}")]
    NotFound { namespace: String, key: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// A namespaced byte store.
///
/// Implementations must be safe to call from many tasks at once; callers
/// add no locking of their own.
pub trait Store: Send + Sync {
    /// Fetch the value at `key`. Absent keys are [`StoreError::NotFound`].
    fn get(&self, namespace: &str, key: &[u8]) -> StoreResult<Vec<u8>>;

    fn set(&self, namespace: &str, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Store a transaction under its id in the ledger namespace.
    fn put_transaction(&self, tx: &Transaction) -> StoreResult<()> {
        let bytes = bincode::serialize(tx).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.set(DATABASE_NAMESPACE, tx.id.as_bytes(), &bytes)
    }

    /// Load a transaction by id from the ledger namespace.
    fn get_transaction(&self, id: &TxId) -> StoreResult<Transaction> {
        let bytes = self.get(DATABASE_NAMESPACE, id.as_bytes())?;
        bincode::deserialize(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// SporeDB
// ---------------------------------------------------------------------------

/// sled-backed [`Store`].
///
/// sled trees support lock-free concurrent reads and serialized writes, so
/// `SporeDB` is shared across tasks as `Arc<SporeDB>` with no extra
/// synchronization.
#[derive(Debug, Clone)]
pub struct SporeDB {
    db: Db,
    /// Cached handle for the ledger namespace; every other namespace is
    /// opened on demand.
    transactions: Tree,
}

impl SporeDB {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped. For tests
    /// and throwaway single-process runs.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let transactions = db.open_tree(DATABASE_NAMESPACE)?;
        Ok(Self { db, transactions })
    }

    fn tree(&self, namespace: &str) -> StoreResult<Tree> {
        if namespace == DATABASE_NAMESPACE {
            return Ok(self.transactions.clone());
        }
        Ok(self.db.open_tree(namespace)?)
    }

    /// Number of transactions persisted.
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl Store for SporeDB {
    fn get(&self, namespace: &str, key: &[u8]) -> StoreResult<Vec<u8>> {
        match self.tree(namespace)?.get(key)? {
            Some(value) => Ok(value.to_vec()),
            None => Err(StoreError::NotFound {
                namespace: namespace.to_string(),
                key: hex::encode(key),
            }),
        }
    }

    fn set(&self, namespace: &str, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.tree(namespace)?.insert(key, value)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::SporeKeypair;
    use crate::transaction::{sign_transaction, TransactionBuilder};

    fn stamped_tx() -> Transaction {
        let kp = SporeKeypair::generate();
        let mut tx = TransactionBuilder::new()
            .from(kp.address())
            .to(vec![0x44; 20])
            .data(b"stored".to_vec())
            .nonce(3)
            .build();
        sign_transaction(&mut tx, &kp).unwrap();
        tx.stamp(1_700_000_000).unwrap();
        tx
    }

    #[test]
    fn raw_get_and_set() {
        let db = SporeDB::open_temporary().unwrap();
        db.set("scratch", b"k", b"v").unwrap();
        assert_eq!(db.get("scratch", b"k").unwrap(), b"v".to_vec());
    }

    #[test]
    fn missing_key_is_not_found() {
        let db = SporeDB::open_temporary().unwrap();
        let err = db.get(DATABASE_NAMESPACE, &[0u8; 32]).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn namespaces_are_isolated() {
        let db = SporeDB::open_temporary().unwrap();
        db.set("a", b"key", b"1").unwrap();
        assert!(db.get("b", b"key").unwrap_err().is_not_found());
    }

    #[test]
    fn transaction_round_trips_by_id() {
        let db = SporeDB::open_temporary().unwrap();
        let tx = stamped_tx();

        db.put_transaction(&tx).unwrap();
        assert_eq!(db.get_transaction(&tx.id).unwrap(), tx);
        assert_eq!(db.transaction_count(), 1);
    }

    #[test]
    fn garbage_value_is_serialization_error() {
        let db = SporeDB::open_temporary().unwrap();
        let id = TxId([7u8; 32]);
        db.set(DATABASE_NAMESPACE, id.as_bytes(), &[0xFF]).unwrap();
        assert!(matches!(
            db.get_transaction(&id),
            Err(StoreError::Serialization(_))
        ));
    }
}
