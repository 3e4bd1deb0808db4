//! # RPC Ingress Gateway
//!
//! The client-facing surface of a peer, and the JSON-RPC 2.0 types it is
//! served with. The HTTP server lives in the node binary; this module is
//! transport-agnostic and turns an [`RpcRequest`] into an [`RpcResponse`].
//!
//! ## Method Index
//!
//! | Method                  | Params              | Result                      |
//! |-------------------------|---------------------|-----------------------------|
//! | `spore_send`            | `[transaction]`     | `{ transaction_id }`        |
//! | `spore_createContract`  | `[transaction]`     | `{ transaction_id }` (*)    |
//! | `spore_getTransaction`  | `[id]`              | transaction                 |
//! | `spore_tips`            | none                | `[id, ...]`                 |
//! | `spore_order`           | none                | `[id, ...]`                 |
//! | `spore_nodeCount`       | none                | number                      |
//!
//! (*) `spore_createContract` answers with the SHA-256 of the payload, not
//! the stamped transaction id. Clients depend on that.
//!
//! ## Submission
//!
//! A submitted transaction is verified, stamped, and admitted to the local
//! ledger before anything is published. A client therefore learns about
//! both bad signatures and ledger refusals, and a refused transaction
//! never reaches the network.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use super::gossip::{Envelope, GossipService};
use crate::admission::{Admission, AdmissionError, AdmissionKind, AdmissionPipeline};
use crate::crypto::keys::Address;
use crate::ledger::{GraphError, Rejection};
use crate::storage::StoreError;
use crate::transaction::{Transaction, TransactionError, TxId};

// ---------------------------------------------------------------------------
// RPC Method Enumeration
// ---------------------------------------------------------------------------

/// Supported JSON-RPC methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcMethod {
    #[serde(rename = "spore_send")]
    Send,
    #[serde(rename = "spore_createContract")]
    CreateContract,
    #[serde(rename = "spore_getTransaction")]
    GetTransaction,
    #[serde(rename = "spore_tips")]
    Tips,
    #[serde(rename = "spore_order")]
    Order,
    #[serde(rename = "spore_nodeCount")]
    NodeCount,
}

impl RpcMethod {
    /// Look up a method by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        serde_json::from_value(Value::String(name.to_string())).ok()
    }
}

// ---------------------------------------------------------------------------
// RPC Request / Response
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request. `method` stays a string so unknown methods can
/// be answered with `-32601` instead of failing to parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: Value, method: RpcMethod, params: Value) -> Self {
        let method = serde_json::to_value(method)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method,
            params,
        }
    }
}

/// A JSON-RPC 2.0 response. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

// ---------------------------------------------------------------------------
// RPC Errors
// ---------------------------------------------------------------------------

/// JSON-RPC 2.0 error object.
///
/// Standard codes `-32700..=-32600`; application codes:
/// - `-32000`: transaction not found
/// - `-32001`: validation failed (signature, id)
/// - `-32002`: ledger refused the transaction
/// - `-32003`: storage failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::new(-32700, msg)
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(-32600, msg)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(-32601, format!("method not found: {method}"))
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(-32602, msg)
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(-32603, msg)
    }

    pub fn transaction_not_found(id: &TxId) -> Self {
        Self::new(-32000, format!("transaction not found: {id}"))
    }

    pub fn validation_failed(msg: impl Into<String>) -> Self {
        Self::new(-32001, msg)
    }

    pub fn admission_rejected(id: &TxId, reason: &Rejection) -> Self {
        Self {
            data: Some(Value::String(id.to_hex())),
            ..Self::new(-32002, format!("admission rejected: {reason}"))
        }
    }

    pub fn storage_error(msg: impl Into<String>) -> Self {
        Self::new(-32003, msg)
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// JSON form of a [`Transaction`]. Byte fields are hex, with or without
/// `0x`. `id` and `created` are empty/zero on submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcTransaction {
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub to: String,
    pub from: String,
    #[serde(default)]
    pub gas: i64,
    #[serde(default)]
    pub gas_price: i64,
    #[serde(default)]
    pub nonce: i32,
    #[serde(default)]
    pub is_contract_creation: bool,
    pub signature: String,
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, GatewayError> {
    hex::decode(value.strip_prefix("0x").unwrap_or(value))
        .map_err(|e| GatewayError::InvalidParams(format!("{field}: {e}")))
}

impl From<&Transaction> for RpcTransaction {
    fn from(tx: &Transaction) -> Self {
        Self {
            data: hex::encode(&tx.data),
            created: tx.created,
            id: if tx.is_stamped() {
                tx.id.to_hex()
            } else {
                String::new()
            },
            to: hex::encode(&tx.to),
            from: tx.from.to_hex(),
            gas: tx.gas,
            gas_price: tx.gas_price,
            nonce: tx.nonce,
            is_contract_creation: tx.is_contract_creation,
            signature: hex::encode(&tx.signature),
        }
    }
}

impl TryFrom<RpcTransaction> for Transaction {
    type Error = GatewayError;

    fn try_from(rpc: RpcTransaction) -> Result<Self, Self::Error> {
        let from: Address = rpc
            .from
            .parse()
            .map_err(|e| GatewayError::InvalidParams(format!("from: {e}")))?;
        let id = if rpc.id.is_empty() {
            TxId::UNSET
        } else {
            rpc.id
                .parse()
                .map_err(|e| GatewayError::InvalidParams(format!("id: {e}")))?
        };
        Ok(Transaction {
            data: decode_hex("data", &rpc.data)?,
            created: rpc.created,
            id,
            to: decode_hex("to", &rpc.to)?,
            from,
            gas: rpc.gas,
            gas_price: rpc.gas_price,
            nonce: rpc.nonce,
            is_contract_creation: rpc.is_contract_creation,
            signature: decode_hex("signature", &rpc.signature)?,
        })
    }
}

/// Result of `spore_send` and `spore_createContract`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub transaction_id: String,
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Errors returned to RPC callers.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("validation failed: {0}")]
    Validation(#[from] TransactionError),

    #[error("{requested:?} requested for a transaction flagged {flagged:?}")]
    KindMismatch {
        requested: AdmissionKind,
        flagged: AdmissionKind,
    },

    #[error("transaction {id} rejected: {reason}")]
    Rejected { id: TxId, reason: Rejection },

    #[error("transaction not found: {0}")]
    NotFound(TxId),

    #[error("storage error: {0}")]
    Storage(#[source] StoreError),

    #[error("ledger error: {0}")]
    Graph(#[from] GraphError),

    #[error("invalid params: {0}")]
    InvalidParams(String),
}

impl From<AdmissionError> for GatewayError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::Validation(inner) => Self::Validation(inner),
            AdmissionError::KindMismatch { requested, flagged } => {
                Self::KindMismatch { requested, flagged }
            }
            AdmissionError::Ledger(inner) => Self::Graph(inner),
        }
    }
}

impl From<GatewayError> for RpcError {
    fn from(err: GatewayError) -> Self {
        match &err {
            GatewayError::Validation(_) | GatewayError::KindMismatch { .. } => {
                RpcError::validation_failed(err.to_string())
            }
            GatewayError::Rejected { id, reason } => RpcError::admission_rejected(id, reason),
            GatewayError::NotFound(id) => RpcError::transaction_not_found(id),
            GatewayError::Storage(_) => RpcError::storage_error(err.to_string()),
            GatewayError::Graph(_) => RpcError::internal_error(err.to_string()),
            GatewayError::InvalidParams(msg) => RpcError::invalid_params(msg.clone()),
        }
    }
}

/// A peer's client-facing operations.
#[derive(Clone)]
pub struct RpcGateway {
    pipeline: AdmissionPipeline,
    gossip: Arc<GossipService>,
}

impl RpcGateway {
    pub fn new(pipeline: AdmissionPipeline, gossip: Arc<GossipService>) -> Self {
        Self { pipeline, gossip }
    }

    pub fn pipeline(&self) -> &AdmissionPipeline {
        &self.pipeline
    }

    /// Submit a transfer. Returns the stamped transaction id.
    ///
    /// The transaction must not be flagged as a contract creation. Any
    /// `id` or `created` the caller set is replaced.
    pub async fn send(&self, tx: Transaction) -> Result<TxId, GatewayError> {
        let tx = self.submit(tx, AdmissionKind::Transfer).await?;
        Ok(tx.id)
    }

    /// Submit a contract deployment. Returns SHA-256 of the payload.
    /// The transaction must be flagged as a contract creation.
    pub async fn create_contract(&self, tx: Transaction) -> Result<[u8; 32], GatewayError> {
        let tx = self.submit(tx, AdmissionKind::ContractCreation).await?;
        Ok(tx.data_hash())
    }

    /// Read a persisted transaction. Touches neither the ledger nor the
    /// network.
    pub fn get_transaction(&self, id: &TxId) -> Result<Transaction, GatewayError> {
        self.pipeline
            .context()
            .store
            .get_transaction(id)
            .map_err(|err| {
                if err.is_not_found() {
                    GatewayError::NotFound(*id)
                } else {
                    GatewayError::Storage(err)
                }
            })
    }

    async fn submit(
        &self,
        tx: Transaction,
        kind: AdmissionKind,
    ) -> Result<Transaction, GatewayError> {
        let valid = self.pipeline.validate_submission(tx)?;
        let id = valid.id();
        let tx = valid.transaction().clone();

        match self.pipeline.admit_validated(valid, kind).await? {
            Admission::Admitted(_) => {}
            Admission::Rejected { id, reason } => {
                return Err(GatewayError::Rejected { id, reason });
            }
        }

        let envelope = match kind {
            AdmissionKind::Transfer => Envelope::SendTransaction(tx.clone()),
            AdmissionKind::ContractCreation => Envelope::CreateContract(tx.clone()),
        };
        if let Err(err) = self.gossip.publish(&envelope).await {
            // The transaction is in the local ledger either way.
            warn!(id = %id.short(), error = %err, "publish failed after local admission");
        }

        info!(id = %id.short(), kind = ?kind, "transaction submitted");
        Ok(tx)
    }

    // -- JSON-RPC dispatch ---------------------------------------------------

    /// Serve one JSON-RPC request.
    pub async fn handle(&self, req: RpcRequest) -> RpcResponse {
        let id = req.id.clone();
        match self.dispatch(req).await {
            Ok(result) => RpcResponse::success(id, result),
            Err(error) => RpcResponse::error(id, error),
        }
    }

    async fn dispatch(&self, req: RpcRequest) -> Result<Value, RpcError> {
        if req.jsonrpc != "2.0" {
            return Err(RpcError::invalid_request(
                "invalid request: jsonrpc must be \"2.0\"",
            ));
        }
        let method =
            RpcMethod::from_name(&req.method).ok_or_else(|| RpcError::method_not_found(&req.method))?;

        match method {
            RpcMethod::Send => {
                let tx = transaction_param(&req.params)?;
                let id = self.send(tx).await?;
                to_json(&TransactionResponse {
                    transaction_id: id.to_hex(),
                })
            }
            RpcMethod::CreateContract => {
                let tx = transaction_param(&req.params)?;
                let hash = self.create_contract(tx).await?;
                to_json(&TransactionResponse {
                    transaction_id: hex::encode(hash),
                })
            }
            RpcMethod::GetTransaction => {
                let id: TxId = first_param(&req.params)
                    .and_then(Value::as_str)
                    .ok_or_else(|| RpcError::invalid_params("expected [id]"))?
                    .parse()
                    .map_err(|e: crate::transaction::ParseTxIdError| {
                        RpcError::invalid_params(e.to_string())
                    })?;
                let tx = self.get_transaction(&id)?;
                to_json(&RpcTransaction::from(&tx))
            }
            RpcMethod::Tips => {
                let tips = self
                    .pipeline
                    .context()
                    .ledger
                    .tips()
                    .map_err(GatewayError::from)?;
                to_json(&tips.iter().map(TxId::to_hex).collect::<Vec<_>>())
            }
            RpcMethod::Order => {
                let order = self
                    .pipeline
                    .context()
                    .ledger
                    .order()
                    .map_err(GatewayError::from)?;
                to_json(&order.iter().map(TxId::to_hex).collect::<Vec<_>>())
            }
            RpcMethod::NodeCount => to_json(&self.pipeline.context().ledger.len()),
        }
    }
}

/// `[x, ...]` yields `x`; a bare object is taken as the only param.
fn first_param(params: &Value) -> Option<&Value> {
    match params {
        Value::Array(items) => items.first(),
        Value::Object(_) => Some(params),
        _ => None,
    }
}

fn transaction_param(params: &Value) -> Result<Transaction, RpcError> {
    let raw = first_param(params)
        .cloned()
        .ok_or_else(|| RpcError::invalid_params("expected [transaction]"))?;
    let rpc: RpcTransaction = serde_json::from_value(raw)
        .map_err(|e| RpcError::invalid_params(format!("transaction: {e}")))?;
    Ok(Transaction::try_from(rpc)?)
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
