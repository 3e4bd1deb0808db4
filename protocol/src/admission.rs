//! # Admission Pipeline
//!
//! Turns a signed transaction into a ledger entry. Every transaction a peer
//! learns about, from its own RPC gateway or from gossip, goes through
//! [`AdmissionPipeline::admit`]:
//!
//! 1. Recover the signer and require it to be `from`.
//! 2. Stamp it (first sighting) or check the stamp it arrived with. Client
//!    submissions are always stamped afresh; see
//!    [`AdmissionPipeline::validate_submission`].
//! 3. Deploy the payload if it is a contract creation. The requested kind
//!    must agree with the signed `is_contract_creation` flag.
//! 4. Attach it to the ledger frontier under the ledger write lock.
//! 5. Invoke the target contract if `to` is a contract id.
//! 6. Hand the body to a background task that writes it to the store.
//!
//! Contract failures never stop admission; they come back as
//! [`ContractOutcome::Failed`]. Persistence failures never undo it; they are
//! retried, then logged, counted, and reported on the event channel.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{
    DEFAULT_ORDERING_WIDTH, EVENT_CHANNEL_CAPACITY, PERSIST_MAX_ATTEMPTS, PERSIST_RETRY_BACKOFF,
};
use crate::contract::{ContractEngine, ContractOutcome, InMemoryContractEngine};
use crate::ledger::{AttachError, GraphError, Ledger, Rejection};
use crate::metrics::LedgerMetrics;
use crate::storage::{SporeDB, Store, StoreError};
use crate::transaction::{verify_signature, verify_stamp, Transaction, TransactionError, TxId};

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything a peer's admission path shares. Built once at startup and
/// cloned into the gateway, the gossip loop, and the HTTP layer.
#[derive(Clone)]
pub struct NodeContext {
    pub ledger: Arc<Ledger>,
    pub store: Arc<dyn Store>,
    pub engine: Arc<dyn ContractEngine>,
    pub metrics: LedgerMetrics,
    events: broadcast::Sender<LedgerEvent>,
}

impl NodeContext {
    pub fn new(
        ledger: Arc<Ledger>,
        store: Arc<dyn Store>,
        engine: Arc<dyn ContractEngine>,
        metrics: LedgerMetrics,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            ledger,
            store,
            engine,
            metrics,
            events,
        }
    }

    /// A self-contained context: temporary sled store, in-memory engine,
    /// default ordering width.
    pub fn ephemeral() -> Result<Self, StoreError> {
        Ok(Self::new(
            Arc::new(Ledger::new(DEFAULT_ORDERING_WIDTH)),
            Arc::new(SporeDB::open_temporary()?),
            Arc::new(InMemoryContractEngine::new()),
            LedgerMetrics::new(),
        ))
    }

    /// Subscribe to admission and persistence events. Contract outcomes of
    /// gossiped transactions are only observable here.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: LedgerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn refresh_graph_gauges(&self) {
        let stats = self.ledger.stats();
        self.metrics.graph_nodes.set(stats.nodes as i64);
        self.metrics.graph_tips.set(stats.tips as i64);
    }
}

impl fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeContext")
            .field("ledger", &self.ledger.stats())
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How a transaction is to be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionKind {
    Transfer,
    ContractCreation,
}

impl AdmissionKind {
    /// The kind a transaction's signed flag asks for.
    pub fn of(tx: &Transaction) -> Self {
        if tx.is_contract_creation {
            Self::ContractCreation
        } else {
            Self::Transfer
        }
    }
}

/// Errors that stop a transaction before it reaches the ledger.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("validation failed: {0}")]
    Validation(#[from] TransactionError),

    #[error("{requested:?} requested for a transaction flagged {flagged:?}")]
    KindMismatch {
        requested: AdmissionKind,
        flagged: AdmissionKind,
    },

    #[error(transparent)]
    Ledger(#[from] GraphError),
}

/// A transaction whose signature and stamp have been checked. Only the
/// pipeline's validators produce one.
#[derive(Debug, Clone)]
pub struct Validated {
    id: TxId,
    tx: Transaction,
}

impl Validated {
    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    pub fn into_inner(self) -> Transaction {
        self.tx
    }
}

/// Result of admitting a valid transaction.
#[derive(Debug)]
pub enum Admission {
    Admitted(AdmittedTransaction),
    /// The ledger refused the node. Nothing was recorded or persisted.
    Rejected { id: TxId, reason: Rejection },
}

impl Admission {
    pub fn id(&self) -> TxId {
        match self {
            Self::Admitted(admitted) => admitted.id,
            Self::Rejected { id, .. } => *id,
        }
    }

    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted(_))
    }

    pub fn into_admitted(self) -> Option<AdmittedTransaction> {
        match self {
            Self::Admitted(admitted) => Some(admitted),
            Self::Rejected { .. } => None,
        }
    }
}

/// A transaction that is now part of the local ledger.
#[derive(Debug)]
pub struct AdmittedTransaction {
    pub id: TxId,
    /// The frontier it attached to.
    pub parents: BTreeSet<TxId>,
    pub contract: ContractOutcome,
    /// The background write. Awaiting it is optional.
    pub persistence: PersistenceHandle,
}

/// Failure of a background write.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("store write failed after {attempts} attempts: {source}")]
    Store {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("persistence task aborted: {0}")]
    Aborted(String),
}

/// Handle to a transaction's background write.
///
/// Dropping it detaches the task; the write still runs to completion.
pub struct PersistenceHandle {
    id: TxId,
    task: JoinHandle<Result<(), PersistenceError>>,
}

impl PersistenceHandle {
    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the write to finish.
    pub async fn wait(self) -> Result<(), PersistenceError> {
        match self.task.await {
            Ok(result) => result,
            Err(join) => Err(PersistenceError::Aborted(join.to_string())),
        }
    }
}

impl fmt::Debug for PersistenceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceHandle")
            .field("id", &self.id)
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

/// Notifications published on [`NodeContext::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    Admitted {
        id: TxId,
        kind: AdmissionKind,
        parents: Vec<TxId>,
        contract: ContractOutcome,
    },
    Rejected {
        id: TxId,
        reason: String,
    },
    Persisted {
        id: TxId,
    },
    PersistenceFailed {
        id: TxId,
        error: String,
    },
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The admission pipeline. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AdmissionPipeline {
    ctx: NodeContext,
}

impl AdmissionPipeline {
    pub fn new(ctx: NodeContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &NodeContext {
        &self.ctx
    }

    /// Verify a relayed transaction and stamp it if it has no id yet.
    ///
    /// A transaction that arrives stamped keeps its `created` value; only
    /// its id is checked. Use this for gossip, never for client input.
    pub fn validate(&self, mut tx: Transaction) -> Result<Validated, AdmissionError> {
        let checked = verify_signature(&tx).and_then(|_| {
            if tx.is_stamped() {
                verify_stamp(&tx)
            } else {
                tx.stamp_now()
            }
        });
        self.checked(tx, checked)
    }

    /// Verify a client submission and stamp it with the current time.
    ///
    /// Any `id` or `created` the client supplied is discarded.
    pub fn validate_submission(&self, mut tx: Transaction) -> Result<Validated, AdmissionError> {
        let checked = verify_signature(&tx).and_then(|_| {
            tx.id = TxId::UNSET;
            tx.created = 0;
            tx.stamp_now()
        });
        self.checked(tx, checked)
    }

    fn checked(
        &self,
        tx: Transaction,
        checked: Result<TxId, TransactionError>,
    ) -> Result<Validated, AdmissionError> {
        match checked {
            Ok(id) => Ok(Validated { id, tx }),
            Err(err) => {
                self.ctx.metrics.validation_failures_total.inc();
                warn!(from = %tx.from, error = %err, "transaction failed validation");
                Err(AdmissionError::Validation(err))
            }
        }
    }

    /// Validate `tx` as a relayed transaction, then admit it.
    ///
    /// `Err` means the transaction was invalid and nothing happened.
    /// `Ok(Rejected)` means it was valid but the ledger refused it.
    pub async fn admit(
        &self,
        tx: Transaction,
        kind: AdmissionKind,
    ) -> Result<Admission, AdmissionError> {
        let valid = self.validate(tx)?;
        self.admit_validated(valid, kind).await
    }

    /// Run the admission sequence for an already validated transaction.
    pub async fn admit_validated(
        &self,
        valid: Validated,
        kind: AdmissionKind,
    ) -> Result<Admission, AdmissionError> {
        let Validated { id, tx } = valid;

        let flagged = AdmissionKind::of(&tx);
        if flagged != kind {
            self.ctx.metrics.validation_failures_total.inc();
            warn!(id = %id.short(), requested = ?kind, flagged = ?flagged, "admission kind does not match flag");
            return Err(AdmissionError::KindMismatch {
                requested: kind,
                flagged,
            });
        }

        // Skip contract work for a node we already hold. The ledger still
        // has the final word below.
        if self.ctx.ledger.contains(&id) {
            return Ok(self.reject(id, Rejection::Duplicate));
        }

        let mut contract = match kind {
            AdmissionKind::ContractCreation => self.deploy(&tx).await,
            AdmissionKind::Transfer => ContractOutcome::NotApplicable,
        };

        let parents = match self.ctx.ledger.attach(id) {
            Ok(parents) => parents,
            Err(AttachError::Rejected(reason)) => return Ok(self.reject(id, reason)),
            Err(AttachError::Corrupted(err)) => return Err(AdmissionError::Ledger(err)),
        };
        self.ctx.metrics.transactions_admitted_total.inc();
        self.ctx.refresh_graph_gauges();

        if kind == AdmissionKind::Transfer {
            contract = self.invoke(&tx).await;
        }

        info!(
            id = %id.short(),
            kind = ?kind,
            parents = parents.len(),
            contract_failed = contract.is_failure(),
            "transaction admitted"
        );
        self.ctx.emit(LedgerEvent::Admitted {
            id,
            kind,
            parents: parents.iter().copied().collect(),
            contract: contract.clone(),
        });

        let persistence = self.persist(tx);
        Ok(Admission::Admitted(AdmittedTransaction {
            id,
            parents,
            contract,
            persistence,
        }))
    }

    fn reject(&self, id: TxId, reason: Rejection) -> Admission {
        self.ctx.metrics.transactions_rejected_total.inc();
        if reason == Rejection::Duplicate {
            debug!(id = %id.short(), "transaction already in ledger");
        } else {
            warn!(id = %id.short(), reason = %reason, "ledger refused transaction");
        }
        self.ctx.emit(LedgerEvent::Rejected {
            id,
            reason: reason.to_string(),
        });
        Admission::Rejected { id, reason }
    }

    async fn deploy(&self, tx: &Transaction) -> ContractOutcome {
        match self.ctx.engine.create(&tx.data).await {
            Ok((contract_id, gas_used)) => ContractOutcome::Created {
                contract_id,
                gas_used,
            },
            Err(err) => {
                self.ctx.metrics.contract_failures_total.inc();
                warn!(id = %tx.id.short(), error = %err, "contract deployment failed");
                ContractOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn invoke(&self, tx: &Transaction) -> ContractOutcome {
        let Some(target) = tx.contract_target() else {
            return ContractOutcome::NotApplicable;
        };
        match self.ctx.engine.call(&target, &tx.data).await {
            Ok((result, gas_used)) => ContractOutcome::Called { result, gas_used },
            Err(err) => {
                self.ctx.metrics.contract_failures_total.inc();
                warn!(id = %tx.id.short(), contract = %target, error = %err, "contract call failed");
                ContractOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Spawn the background write for an admitted transaction. Store
    /// writes block, so each attempt runs on the blocking pool.
    fn persist(&self, tx: Transaction) -> PersistenceHandle {
        let id = tx.id;
        let ctx = self.ctx.clone();
        let tx = Arc::new(tx);

        let task = tokio::spawn(async move {
            let mut backoff = PERSIST_RETRY_BACKOFF;
            let mut attempt = 1;
            loop {
                let store = Arc::clone(&ctx.store);
                let body = Arc::clone(&tx);
                let written = tokio::task::spawn_blocking(move || store.put_transaction(&body))
                    .await
                    .map_err(|join| PersistenceError::Aborted(join.to_string()))?;
                match written {
                    Ok(()) => {
                        debug!(id = %id.short(), attempt, "transaction persisted");
                        ctx.emit(LedgerEvent::Persisted { id });
                        return Ok(());
                    }
                    Err(err) if attempt < PERSIST_MAX_ATTEMPTS => {
                        warn!(id = %id.short(), attempt, error = %err, "persist failed, retrying");
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                        attempt += 1;
                    }
                    Err(err) => {
                        ctx.metrics.persistence_failures_total.inc();
                        error!(id = %id.short(), attempts = attempt, error = %err, "giving up on persisting transaction");
                        ctx.emit(LedgerEvent::PersistenceFailed {
                            id,
                            error: err.to_string(),
                        });
                        return Err(PersistenceError::Store {
                            attempts: attempt,
                            source: err,
                        });
                    }
                }
            }
        });

        PersistenceHandle { id, task }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ContractId;
    use crate::crypto::hash::sha256;
    use crate::crypto::keys::SporeKeypair;
    use crate::storage::StoreResult;
    use crate::transaction::{sign_transaction, TransactionBuilder};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn signed(kp: &SporeKeypair, to: Vec<u8>, data: &[u8], nonce: i32) -> Transaction {
        let mut tx = TransactionBuilder::new()
            .from(kp.address())
            .to(to)
            .data(data.to_vec())
            .gas(100)
            .gas_price(1)
            .nonce(nonce)
            .build();
        sign_transaction(&mut tx, kp).unwrap();
        tx
    }

    fn pipeline() -> AdmissionPipeline {
        AdmissionPipeline::new(NodeContext::ephemeral().unwrap())
    }

    #[tokio::test]
    async fn valid_transfer_is_admitted_and_persisted() {
        let pipeline = pipeline();
        let mut events = pipeline.context().subscribe();
        let kp = SporeKeypair::generate();
        let tx = signed(&kp, vec![0x11; 20], b"hi", 1);
        let expected_id = tx.compute_id().unwrap();

        let admitted = pipeline
            .admit(tx, AdmissionKind::Transfer)
            .await
            .unwrap()
            .into_admitted()
            .unwrap();

        assert_eq!(admitted.id, expected_id);
        assert!(admitted.parents.is_empty());
        assert_eq!(admitted.contract, ContractOutcome::NotApplicable);
        admitted.persistence.wait().await.unwrap();

        let ctx = pipeline.context();
        let stored = ctx.store.get_transaction(&expected_id).unwrap();
        assert_eq!(stored.id, expected_id);
        assert!(stored.created > 0);
        assert_eq!(ctx.metrics.transactions_admitted_total.get(), 1);
        assert_eq!(ctx.metrics.graph_nodes.get(), 1);

        assert!(matches!(events.recv().await.unwrap(), LedgerEvent::Admitted { id, .. } if id == expected_id));
        assert_eq!(
            events.recv().await.unwrap(),
            LedgerEvent::Persisted { id: expected_id }
        );
    }

    #[tokio::test]
    async fn second_transaction_attaches_to_first() {
        let pipeline = pipeline();
        let kp = SporeKeypair::generate();

        let first = pipeline
            .admit(signed(&kp, vec![1; 20], b"a", 1), AdmissionKind::Transfer)
            .await
            .unwrap();
        let second = pipeline
            .admit(signed(&kp, vec![1; 20], b"b", 2), AdmissionKind::Transfer)
            .await
            .unwrap()
            .into_admitted()
            .unwrap();

        assert_eq!(second.parents, BTreeSet::from([first.id()]));
        assert_eq!(
            pipeline.context().ledger.tips().unwrap(),
            BTreeSet::from([second.id])
        );
    }

    #[tokio::test]
    async fn bad_signature_never_reaches_ledger() {
        let pipeline = pipeline();
        let kp = SporeKeypair::generate();
        let mut tx = signed(&kp, vec![2; 20], b"x", 1);
        tx.signature[10] ^= 0xFF;

        let err = pipeline.admit(tx, AdmissionKind::Transfer).await.unwrap_err();
        assert!(matches!(err, AdmissionError::Validation(_)));

        let ctx = pipeline.context();
        assert!(ctx.ledger.is_empty());
        assert_eq!(ctx.metrics.validation_failures_total.get(), 1);
    }

    #[tokio::test]
    async fn forged_stamp_is_rejected() {
        let pipeline = pipeline();
        let kp = SporeKeypair::generate();
        let mut tx = signed(&kp, vec![2; 20], b"x", 1);
        tx.stamp(10).unwrap();
        tx.id = TxId([0xEE; 32]);

        let err = pipeline.admit(tx, AdmissionKind::Transfer).await.unwrap_err();
        assert!(matches!(
            err,
            AdmissionError::Validation(TransactionError::IdMismatch { .. })
        ));
    }

    #[test]
    fn submission_stamp_is_replaced() {
        let pipeline = pipeline();
        let kp = SporeKeypair::generate();
        let mut tx = signed(&kp, vec![2; 20], b"x", 1);
        let id = tx.stamp(1).unwrap();

        let valid = pipeline.validate_submission(tx).unwrap();
        assert_eq!(valid.id(), id);
        assert!(valid.transaction().created > 1_600_000_000);
    }

    #[test]
    fn submission_with_forged_id_is_restamped() {
        let pipeline = pipeline();
        let kp = SporeKeypair::generate();
        let mut tx = signed(&kp, vec![2; 20], b"x", 1);
        let expected = tx.compute_id().unwrap();
        tx.id = TxId([0xEE; 32]);

        let valid = pipeline.validate_submission(tx).unwrap();
        assert_eq!(valid.id(), expected);
    }

    #[tokio::test]
    async fn kind_must_match_flag() {
        let pipeline = pipeline();
        let kp = SporeKeypair::generate();
        let tx = signed(&kp, vec![2; 20], b"x", 1);

        let err = pipeline
            .admit(tx, AdmissionKind::ContractCreation)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AdmissionError::KindMismatch {
                requested: AdmissionKind::ContractCreation,
                flagged: AdmissionKind::Transfer,
            }
        ));
        let ctx = pipeline.context();
        assert!(ctx.ledger.is_empty());
        assert_eq!(ctx.metrics.validation_failures_total.get(), 1);
    }

    #[tokio::test]
    async fn received_stamp_is_kept() {
        let pipeline = pipeline();
        let kp = SporeKeypair::generate();
        let mut tx = signed(&kp, vec![2; 20], b"x", 1);
        let id = tx.stamp(1_234).unwrap();

        let admitted = pipeline
            .admit(tx, AdmissionKind::Transfer)
            .await
            .unwrap()
            .into_admitted()
            .unwrap();
        admitted.persistence.wait().await.unwrap();

        let stored = pipeline.context().store.get_transaction(&id).unwrap();
        assert_eq!(stored.created, 1_234);
    }

    #[tokio::test]
    async fn duplicate_is_rejected_not_failed() {
        let pipeline = pipeline();
        let kp = SporeKeypair::generate();
        let tx = signed(&kp, vec![3; 20], b"dup", 1);

        let first = pipeline.admit(tx.clone(), AdmissionKind::Transfer).await.unwrap();
        let second = pipeline.admit(tx, AdmissionKind::Transfer).await.unwrap();

        assert!(first.is_admitted());
        match second {
            Admission::Rejected { id, reason } => {
                assert_eq!(id, first.id());
                assert_eq!(reason, Rejection::Duplicate);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(pipeline.context().ledger.len(), 1);
        assert_eq!(pipeline.context().metrics.transactions_rejected_total.get(), 1);
    }

    #[tokio::test]
    async fn contract_creation_deploys_before_admission() {
        let pipeline = pipeline();
        let kp = SporeKeypair::generate();
        let mut tx = TransactionBuilder::new()
            .from(kp.address())
            .data(b"\0asm module".to_vec())
            .contract_creation(true)
            .build();
        sign_transaction(&mut tx, &kp).unwrap();

        let admitted = pipeline
            .admit(tx, AdmissionKind::ContractCreation)
            .await
            .unwrap()
            .into_admitted()
            .unwrap();

        assert_eq!(
            admitted.contract,
            ContractOutcome::Created {
                contract_id: ContractId(sha256(b"\0asm module")),
                gas_used: 11,
            }
        );
    }

    #[tokio::test]
    async fn failed_call_is_still_recorded() {
        let pipeline = pipeline();
        let kp = SporeKeypair::generate();
        let tx = signed(&kp, vec![0x77; 32], b"call", 1);

        let admitted = pipeline
            .admit(tx, AdmissionKind::Transfer)
            .await
            .unwrap()
            .into_admitted()
            .unwrap();

        assert!(admitted.contract.is_failure());
        assert!(pipeline.context().ledger.contains(&admitted.id));
        assert_eq!(pipeline.context().metrics.contract_failures_total.get(), 1);
    }

    #[tokio::test]
    async fn call_reaches_deployed_contract() {
        let pipeline = pipeline();
        let kp = SporeKeypair::generate();
        let (contract, _) = pipeline.context().engine.create(b"code").await.unwrap();

        let tx = signed(&kp, contract.0.to_vec(), b"args", 1);
        let admitted = pipeline
            .admit(tx, AdmissionKind::Transfer)
            .await
            .unwrap()
            .into_admitted()
            .unwrap();

        assert_eq!(
            admitted.contract,
            ContractOutcome::Called {
                result: b"args".to_vec(),
                gas_used: 4,
            }
        );
    }

    /// Fails every write and counts attempts.
    #[derive(Default)]
    struct BrokenStore {
        attempts: AtomicU32,
    }

    impl Store for BrokenStore {
        fn get(&self, namespace: &str, key: &[u8]) -> StoreResult<Vec<u8>> {
            Err(StoreError::NotFound {
                namespace: namespace.into(),
                key: hex::encode(key),
            })
        }

        fn set(&self, _: &str, _: &[u8], _: &[u8]) -> StoreResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Serialization("disk on fire".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_failure_is_observable_not_fatal() {
        let store = Arc::new(BrokenStore::default());
        let ctx = NodeContext::new(
            Arc::new(Ledger::new(16)),
            store.clone(),
            Arc::new(InMemoryContractEngine::new()),
            LedgerMetrics::new(),
        );
        let pipeline = AdmissionPipeline::new(ctx);
        let kp = SporeKeypair::generate();

        let admitted = pipeline
            .admit(signed(&kp, vec![5; 20], b"p", 1), AdmissionKind::Transfer)
            .await
            .unwrap()
            .into_admitted()
            .unwrap();
        let id = admitted.id;

        let err = admitted.persistence.wait().await.unwrap_err();
        assert!(matches!(err, PersistenceError::Store { attempts, .. } if attempts == PERSIST_MAX_ATTEMPTS));
        assert_eq!(store.attempts.load(Ordering::SeqCst), PERSIST_MAX_ATTEMPTS);

        let ctx = pipeline.context();
        assert!(ctx.ledger.contains(&id));
        assert_eq!(ctx.metrics.persistence_failures_total.get(), 1);
    }
}
