//! # Storage Module
//!
//! The persistence collaborator: a namespaced byte store behind the
//! [`Store`] trait, and [`SporeDB`], its sled implementation.
//!
//! The ledger graph itself is in-memory only. What survives a restart is
//! the transaction bodies, keyed by id, which is what `GetTransaction`
//! reads.

pub mod db;

pub use db::{SporeDB, Store, StoreError, StoreResult};
