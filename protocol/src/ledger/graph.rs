//! The ledger DAG: transaction ids linked to the tips they attached to.
//!
//! Nodes are only ever added, never removed or changed. A node may only
//! reference parents that are already present, so the graph is acyclic by
//! construction.
//!
//! The frontier (`tips`) is kept as a cache and updated on every insert.
//! [`LedgerGraph::derived_tips`] recomputes it from parent references alone;
//! the two must always agree.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transaction::TxId;

/// A vertex in the ledger graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerNode {
    pub id: TxId,
    /// The frontier this node attached to at insertion time.
    pub parents: BTreeSet<TxId>,
    /// Local insertion sequence number, starting at 0. Peers disagree on
    /// this value; it is diagnostic only and never feeds into ordering.
    pub seq: u64,
}

/// Why an insertion was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("node already present")]
    Duplicate,

    #[error("parent {0} is not in the graph")]
    MissingParent(TxId),

    #[error("node lists itself as a parent")]
    SelfReference,
}

/// Internal inconsistency. Seeing this means a bug, not bad input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("ledger graph corrupted: {0}")]
    Corrupted(String),
}

/// The in-memory DAG.
#[derive(Debug)]
pub struct LedgerGraph {
    /// Maximum number of ready nodes released per ordering round.
    k: usize,
    nodes: HashMap<TxId, LedgerNode>,
    /// Reverse edges.
    children: HashMap<TxId, BTreeSet<TxId>>,
    tips: BTreeSet<TxId>,
    next_seq: u64,
}

impl LedgerGraph {
    /// An empty graph. `k` is clamped to at least 1.
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            nodes: HashMap::new(),
            children: HashMap::new(),
            tips: BTreeSet::new(),
            next_seq: 0,
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &TxId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &TxId) -> Option<&LedgerNode> {
        self.nodes.get(id)
    }

    /// The cached frontier, unchecked.
    pub fn frontier(&self) -> &BTreeSet<TxId> {
        &self.tips
    }

    #[cfg(test)]
    pub(crate) fn insert_stale_tip(&mut self, id: TxId) {
        self.tips.insert(id);
    }

    /// The current frontier.
    ///
    /// Fails only if the cache references a node that is missing or has
    /// children.
    pub fn tips(&self) -> Result<BTreeSet<TxId>, GraphError> {
        for tip in &self.tips {
            if !self.nodes.contains_key(tip) {
                return Err(GraphError::Corrupted(format!("tip {tip} has no node")));
            }
            if self.children.get(tip).is_some_and(|c| !c.is_empty()) {
                return Err(GraphError::Corrupted(format!("tip {tip} has children")));
            }
        }
        Ok(self.tips.clone())
    }

    /// The frontier recomputed from parent references: every node that no
    /// other node names as a parent.
    pub fn derived_tips(&self) -> BTreeSet<TxId> {
        let referenced: BTreeSet<&TxId> = self
            .nodes
            .values()
            .flat_map(|node| node.parents.iter())
            .collect();
        self.nodes
            .keys()
            .filter(|id| !referenced.contains(id))
            .copied()
            .collect()
    }

    /// Insert `id` referencing `parents`. Returns `false` if refused.
    pub fn add(&mut self, id: TxId, parents: BTreeSet<TxId>) -> bool {
        self.try_add(id, parents).is_ok()
    }

    /// Insert `id` referencing `parents`, reporting why on refusal.
    ///
    /// A refused insert leaves the graph untouched.
    pub fn try_add(&mut self, id: TxId, parents: BTreeSet<TxId>) -> Result<(), Rejection> {
        if self.nodes.contains_key(&id) {
            return Err(Rejection::Duplicate);
        }
        if parents.contains(&id) {
            return Err(Rejection::SelfReference);
        }
        if let Some(missing) = parents.iter().find(|p| !self.nodes.contains_key(p)) {
            return Err(Rejection::MissingParent(*missing));
        }

        for parent in &parents {
            self.children.entry(*parent).or_default().insert(id);
            self.tips.remove(parent);
        }
        self.tips.insert(id);

        let seq = self.next_seq;
        self.next_seq += 1;
        self.nodes.insert(id, LedgerNode { id, parents, seq });
        Ok(())
    }

    /// Deterministic total order consistent with parent references.
    ///
    /// Kahn's algorithm over a ready set sorted by id. Each round releases
    /// at most `k` ready nodes, smallest id first; children that become
    /// ready join the set for the following round. The result depends only
    /// on the node/edge set and `k`, never on arrival order.
    pub fn order(&self) -> Result<Vec<TxId>, GraphError> {
        let mut pending: HashMap<TxId, usize> = self
            .nodes
            .values()
            .map(|node| (node.id, node.parents.len()))
            .collect();

        let mut ready: BTreeSet<TxId> = pending
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut out = Vec::with_capacity(self.nodes.len());
        while !ready.is_empty() {
            let round: Vec<TxId> = ready.iter().take(self.k).copied().collect();
            for id in round {
                ready.remove(&id);
                out.push(id);
                let Some(children) = self.children.get(&id) else {
                    continue;
                };
                for child in children {
                    let remaining = pending.get_mut(child).ok_or_else(|| {
                        GraphError::Corrupted(format!("child {child} of {id} has no node"))
                    })?;
                    *remaining -= 1;
                    if *remaining == 0 {
                        ready.insert(*child);
                    }
                }
            }
        }

        if out.len() != self.nodes.len() {
            return Err(GraphError::Corrupted(format!(
                "ordering reached {} of {} nodes",
                out.len(),
                self.nodes.len()
            )));
        }
        Ok(out)
    }

    /// Copy of every node, keyed by id.
    pub fn nodes(&self) -> BTreeMap<TxId, LedgerNode> {
        self.nodes.iter().map(|(id, n)| (*id, n.clone())).collect()
    }
}
