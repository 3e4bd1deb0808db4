//! # Contract Engine Interface
//!
//! Admission hands contract work to a [`ContractEngine`]: deployment for
//! contract-creation transactions, invocation for transfers addressed to a
//! 32-byte contract id. The engine is a collaborator; the ledger records a
//! transaction whether or not its contract work succeeds, and reports what
//! happened as a [`ContractOutcome`].
//!
//! [`InMemoryContractEngine`] is the reference engine used by tests and by
//! nodes started without an execution backend. It stores deployed payloads
//! and echoes call input back; it does not execute anything.

use std::fmt;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::CONTRACT_ID_LENGTH;
use crate::crypto::hash::sha256;
use crate::crypto::hex_serde::impl_hex_serde;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Identifier of a deployed contract.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContractId(pub [u8; CONTRACT_ID_LENGTH]);

impl_hex_serde!(ContractId, CONTRACT_ID_LENGTH, "contract id");

impl ContractId {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContractId({})", &self.to_hex()[..8])
    }
}

/// Errors reported by a contract engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContractError {
    #[error("empty contract payload")]
    EmptyPayload,

    #[error("unknown contract {0}")]
    UnknownContract(ContractId),

    #[error("contract execution failed: {0}")]
    Execution(String),
}

/// What the engine did with an admitted transaction.
///
/// A transaction is recorded in the ledger regardless of this value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ContractOutcome {
    /// Plain transfer; no contract was involved.
    NotApplicable,
    Created { contract_id: ContractId, gas_used: u64 },
    Called { result: Vec<u8>, gas_used: u64 },
    /// The engine returned an error. The transaction is still recorded.
    Failed { reason: String },
}

impl ContractOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

// ---------------------------------------------------------------------------
// Engine trait
// ---------------------------------------------------------------------------

/// A contract execution backend.
///
/// Implementations handle their own concurrency; admission calls them from
/// many tasks without extra locking.
#[async_trait]
pub trait ContractEngine: Send + Sync {
    /// Deploy `payload`, returning the new contract's id and the gas spent.
    async fn create(&self, payload: &[u8]) -> Result<(ContractId, u64), ContractError>;

    /// Invoke `contract` with `payload`, returning its output and gas spent.
    async fn call(
        &self,
        contract: &ContractId,
        payload: &[u8],
    ) -> Result<(Vec<u8>, u64), ContractError>;
}

// ---------------------------------------------------------------------------
// InMemoryContractEngine
// ---------------------------------------------------------------------------

/// Registry-only engine: deploys by content hash, calls echo their input.
///
/// Gas is charged at one unit per payload byte.
#[derive(Debug, Default)]
pub struct InMemoryContractEngine {
    contracts: DashMap<ContractId, Vec<u8>>,
}

impl InMemoryContractEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contract_count(&self) -> usize {
        self.contracts.len()
    }

    pub fn code(&self, id: &ContractId) -> Option<Vec<u8>> {
        self.contracts.get(id).map(|code| code.value().clone())
    }
}

#[async_trait]
impl ContractEngine for InMemoryContractEngine {
    async fn create(&self, payload: &[u8]) -> Result<(ContractId, u64), ContractError> {
        if payload.is_empty() {
            return Err(ContractError::EmptyPayload);
        }
        let id = ContractId(sha256(payload));
        self.contracts.entry(id).or_insert_with(|| payload.to_vec());
        debug!(contract = %id, size = payload.len(), "contract deployed");
        Ok((id, payload.len() as u64))
    }

    async fn call(
        &self,
        contract: &ContractId,
        payload: &[u8],
    ) -> Result<(Vec<u8>, u64), ContractError> {
        if !self.contracts.contains_key(contract) {
            return Err(ContractError::UnknownContract(*contract));
        }
        Ok((payload.to_vec(), payload.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_is_content_addressed() {
        let engine = InMemoryContractEngine::new();
        let (id, gas) = engine.create(b"wasm bytes").await.unwrap();

        assert_eq!(id, ContractId(sha256(b"wasm bytes")));
        assert_eq!(gas, 10);
        assert_eq!(engine.code(&id).unwrap(), b"wasm bytes".to_vec());

        // Redeploying identical code is harmless.
        let (again, _) = engine.create(b"wasm bytes").await.unwrap();
        assert_eq!(again, id);
        assert_eq!(engine.contract_count(), 1);
    }

    #[tokio::test]
    async fn empty_payload_is_rejected() {
        let engine = InMemoryContractEngine::new();
        assert_eq!(
            engine.create(&[]).await.unwrap_err(),
            ContractError::EmptyPayload
        );
    }

    #[tokio::test]
    async fn call_requires_deployed_contract() {
        let engine = InMemoryContractEngine::new();
        let missing = ContractId([3u8; 32]);
        assert_eq!(
            engine.call(&missing, b"x").await.unwrap_err(),
            ContractError::UnknownContract(missing)
        );

        let (id, _) = engine.create(b"code").await.unwrap();
        let (out, gas) = engine.call(&id, b"input").await.unwrap();
        assert_eq!(out, b"input".to_vec());
        assert_eq!(gas, 5);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(ContractOutcome::Failed {
            reason: "boom".into(),
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "boom");
    }
}
