// Copyright (c) 2026 Spore Framework Contributors. MIT License.
// See LICENSE for details.

//! # Spore Protocol: Core Library
//!
//! Spore is a peer-to-peer ledger without blocks. Every transaction is a
//! node in a directed acyclic graph and points at the frontier it saw when
//! it was admitted. Peers exchange signed transactions over a pub/sub
//! topic; each one verifies, stamps, and attaches them locally.
//!
//! ## Architecture
//!
//! - **crypto**: secp256k1 recoverable signatures, SHA-256, Keccak addresses.
//! - **transaction**: the transaction record, its canonical encoding, signing.
//! - **ledger**: the DAG, its frontier, and the deterministic ordering pass.
//! - **admission**: verify, stamp, attach, run contracts, persist.
//! - **contract**: the contract engine collaborator.
//! - **storage**: sled-backed transaction store.
//! - **network**: transport trait, gossip envelopes, RPC gateway.
//! - **metrics**: Prometheus counters for the failure paths.
//! - **config**: protocol constants.
//!
//! ## Flow
//!
//! ```text
//! client ──RPC──▶ RpcGateway ──▶ AdmissionPipeline ──▶ Ledger
//!                     │                 ▲                 │
//!                     ▼                 │                 ▼
//!               GossipService ◀── receive loop      Store (async)
//! ```

pub mod admission;
pub mod config;
pub mod contract;
pub mod crypto;
pub mod ledger;
pub mod metrics;
pub mod network;
pub mod storage;
pub mod transaction;

pub use admission::{Admission, AdmissionKind, AdmissionPipeline, LedgerEvent, NodeContext};
pub use ledger::Ledger;
pub use transaction::{Transaction, TransactionBuilder, TxId};
