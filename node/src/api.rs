//! # REST + WebSocket API
//!
//! The axum router for a Spore peer. All endpoints share [`AppState`]
//! through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                 | Description                              |
//! |--------|----------------------|------------------------------------------|
//! | GET    | `/health`            | Liveness probe                           |
//! | GET    | `/status`            | Ledger and peer summary                  |
//! | POST   | `/rpc`               | JSON-RPC 2.0 gateway                     |
//! | GET    | `/ws`                | Live admission and persistence events    |
//! | GET    | `/transactions/:id`  | Persisted transaction by id              |
//! | GET    | `/graph/tips`        | Current frontier                         |
//! | GET    | `/graph/order`       | Deterministic total order of the ledger  |

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use spore_protocol::ledger::GraphError;
use spore_protocol::network::rpc::{
    GatewayError, RpcError, RpcGateway, RpcMethod, RpcRequest, RpcResponse, RpcTransaction,
};
use spore_protocol::transaction::TxId;

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared state for every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub gateway: RpcGateway,
    /// Connected P2P peers, kept current by the transport.
    pub peer_count: Arc<AtomicU64>,
    pub metrics: SharedMetrics,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub nodes: usize,
    pub tips: usize,
    pub ordering_width: usize,
    pub peer_count: u64,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the API router with CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/rpc", post(rpc_handler))
        .route("/ws", get(ws_handler))
        .route("/transactions/:id", get(transaction_handler))
        .route("/graph/tips", get(tips_handler))
        .route("/graph/order", get(order_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: 200 while the process is up.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let ledger = &state.gateway.pipeline().context().ledger;
    let stats = ledger.stats();
    Json(StatusResponse {
        version: state.version.clone(),
        nodes: stats.nodes,
        tips: stats.tips,
        ordering_width: ledger.read(|g| g.k()),
        peer_count: state.peer_count.load(Ordering::Relaxed),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `POST /rpc`: JSON-RPC 2.0.
///
/// The body is parsed here rather than by the `Json` extractor so that a
/// malformed request still gets a JSON-RPC `-32700` instead of a bare 4xx.
async fn rpc_handler(State(state): State<AppState>, body: Bytes) -> Json<RpcResponse> {
    let _timer = state.metrics.rpc_latency_seconds.start_timer();

    let req: RpcRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            state
                .metrics
                .rpc_requests_total
                .with_label_values(&["invalid", "error"])
                .inc();
            return Json(RpcResponse::error(
                Value::Null,
                RpcError::parse_error(format!("parse error: {e}")),
            ));
        }
    };

    let method = if RpcMethod::from_name(&req.method).is_some() {
        req.method.clone()
    } else {
        "unknown".to_string()
    };
    let resp = state.gateway.handle(req).await;
    let outcome = if resp.error.is_some() { "error" } else { "ok" };
    state
        .metrics
        .rpc_requests_total
        .with_label_values(&[method.as_str(), outcome])
        .inc();
    Json(resp)
}

/// `GET /ws`: pushes every [`LedgerEvent`](spore_protocol::LedgerEvent) as
/// JSON. Client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.gateway.pipeline().context().subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to serialize ws event");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "ws subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

/// `GET /transactions/:id`: a persisted transaction, by hex id.
async fn transaction_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let id: TxId = match id.parse() {
        Ok(id) => id,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };
    match state.gateway.get_transaction(&id) {
        Ok(tx) => (StatusCode::OK, Json(RpcTransaction::from(&tx))).into_response(),
        Err(GatewayError::NotFound(_)) => error_response(
            StatusCode::NOT_FOUND,
            format!("transaction not found: {id}"),
        ),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn tips_handler(State(state): State<AppState>) -> Response {
    ids_response(state.gateway.pipeline().context().ledger.tips().map(|t| t.into_iter().collect()))
}

async fn order_handler(State(state): State<AppState>) -> Response {
    ids_response(state.gateway.pipeline().context().ledger.order())
}

fn ids_response(ids: Result<Vec<TxId>, GraphError>) -> Response {
    match ids {
        Ok(ids) => {
            let hex: Vec<String> = ids.iter().map(TxId::to_hex).collect();
            (StatusCode::OK, Json(hex)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "ledger graph inconsistent");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
