//! # Ledger Module
//!
//! The shared ledger: a [`LedgerGraph`] behind a single `parking_lot`
//! read-write lock.
//!
//! ## Locking
//!
//! - [`Ledger::attach`] takes the write lock once and, under it, reads the
//!   frontier and inserts the new node referencing it. No other insert can
//!   see or change the frontier in between, so concurrent admissions form a
//!   strict sequence.
//! - Every read takes the read lock for its whole duration and therefore
//!   sees one point-in-time state: a tip set and an ordering are never torn
//!   by a concurrent insert.
//!
//! The lock is never held across an `.await`.

pub mod graph;

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, trace};

use crate::transaction::TxId;

pub use graph::{GraphError, LedgerGraph, LedgerNode, Rejection};

/// Node and tip counts read under one lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub nodes: usize,
    pub tips: usize,
}

/// Why [`Ledger::attach`] inserted nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error(transparent)]
    Corrupted(#[from] GraphError),
}

/// Thread-safe handle to the ledger graph. Share it as `Arc<Ledger>`.
#[derive(Debug)]
pub struct Ledger {
    graph: RwLock<LedgerGraph>,
}

impl Ledger {
    pub fn new(k: usize) -> Self {
        Self {
            graph: RwLock::new(LedgerGraph::new(k)),
        }
    }

    /// Attach `id` to the current frontier, returning the parents it got.
    ///
    /// The frontier is read through [`LedgerGraph::tips`], so a corrupted
    /// tip cache stops the insert instead of spreading into new edges.
    pub fn attach(&self, id: TxId) -> Result<BTreeSet<TxId>, AttachError> {
        let mut graph = self.graph.write();
        let parents = graph.tips().map_err(|err| {
            error!(id = %id.short(), error = %err, "refusing to attach to corrupted frontier");
            err
        })?;
        graph.try_add(id, parents.clone())?;
        trace!(id = %id.short(), parents = parents.len(), "node attached");
        Ok(parents)
    }

    /// Insert with explicit parents. Same semantics as [`LedgerGraph::add`].
    pub fn add(&self, id: TxId, parents: BTreeSet<TxId>) -> bool {
        self.graph.write().add(id, parents)
    }

    pub fn tips(&self) -> Result<BTreeSet<TxId>, GraphError> {
        self.graph.read().tips()
    }

    pub fn order(&self) -> Result<Vec<TxId>, GraphError> {
        self.graph.read().order()
    }

    pub fn nodes(&self) -> BTreeMap<TxId, LedgerNode> {
        self.graph.read().nodes()
    }

    pub fn get(&self, id: &TxId) -> Option<LedgerNode> {
        self.graph.read().get(id).cloned()
    }

    pub fn contains(&self, id: &TxId) -> bool {
        self.graph.read().contains(id)
    }

    pub fn len(&self) -> usize {
        self.graph.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.read().is_empty()
    }

    pub fn stats(&self) -> LedgerStats {
        let graph = self.graph.read();
        LedgerStats {
            nodes: graph.len(),
            tips: graph.frontier().len(),
        }
    }

    /// Run `f` against the graph under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&LedgerGraph) -> R) -> R {
        f(&self.graph.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn id(n: u32) -> TxId {
        let mut bytes = [0u8; 32];
        bytes[..4].copy_from_slice(&n.to_be_bytes());
        TxId(bytes)
    }

    #[test]
    fn attach_links_to_frontier() {
        let ledger = Ledger::new(16);

        assert!(ledger.attach(id(1)).unwrap().is_empty());
        assert_eq!(ledger.attach(id(2)).unwrap(), BTreeSet::from([id(1)]));
        assert_eq!(ledger.tips().unwrap(), BTreeSet::from([id(2)]));
        assert_eq!(
            ledger.attach(id(2)),
            Err(AttachError::Rejected(Rejection::Duplicate))
        );
    }

    #[test]
    fn attach_refuses_corrupted_frontier() {
        let ledger = Ledger::new(16);
        ledger.attach(id(1)).unwrap();
        ledger.graph.write().insert_stale_tip(id(99));

        assert!(matches!(
            ledger.attach(id(2)),
            Err(AttachError::Corrupted(GraphError::Corrupted(_)))
        ));
        assert!(!ledger.contains(&id(2)));
    }

    #[test]
    fn attach_absorbs_wide_frontier() {
        let ledger = Ledger::new(16);
        ledger.add(id(1), BTreeSet::new());
        ledger.add(id(2), BTreeSet::new());

        let parents = ledger.attach(id(3)).unwrap();
        assert_eq!(parents, BTreeSet::from([id(1), id(2)]));
        assert_eq!(ledger.stats(), LedgerStats { nodes: 3, tips: 1 });
    }

    #[test]
    fn concurrent_attaches_lose_nothing() {
        const THREADS: u32 = 16;
        const PER_THREAD: u32 = 50;
        let ledger = Arc::new(Ledger::new(1621));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        ledger.attach(id(t * PER_THREAD + i)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let total = (THREADS * PER_THREAD) as usize;
        let nodes = ledger.nodes();
        assert_eq!(nodes.len(), total);

        // Every attach saw the previous one's frontier, so the result is a
        // single chain in seq order.
        let mut by_seq: Vec<&LedgerNode> = nodes.values().collect();
        by_seq.sort_by_key(|n| n.seq);
        assert!(by_seq[0].parents.is_empty());
        for pair in by_seq.windows(2) {
            assert_eq!(pair[1].parents, BTreeSet::from([pair[0].id]));
        }

        let tips = ledger.tips().unwrap();
        assert_eq!(tips.len(), 1);
        assert_eq!(ledger.read(|g| g.derived_tips()), tips);

        let order = ledger.order().unwrap();
        let expected: Vec<TxId> = by_seq.iter().map(|n| n.id).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn reads_run_alongside_writes() {
        let ledger = Arc::new(Ledger::new(8));
        let writer = {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                for n in 0..500 {
                    ledger.attach(id(n)).unwrap();
                }
            })
        };

        let reader = {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                for _ in 0..200 {
                    let (order, len) = ledger.read(|g| (g.order().unwrap(), g.len()));
                    assert_eq!(order.len(), len);
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(ledger.len(), 500);
    }
}
