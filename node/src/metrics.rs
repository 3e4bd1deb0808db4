//! # Prometheus Metrics
//!
//! Node-level metrics, registered into the same `spore`-prefixed registry
//! as the ledger core's [`LedgerMetrics`], so one scrape of `/metrics` on
//! the metrics port returns both.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts};
use std::sync::Arc;

use spore_protocol::metrics::LedgerMetrics;

/// Metric handles for the HTTP and P2P layers.
#[derive(Clone)]
pub struct NodeMetrics {
    ledger: LedgerMetrics,
    /// JSON-RPC requests, labelled by method and outcome.
    pub rpc_requests_total: IntCounterVec,
    pub rpc_latency_seconds: Histogram,
    /// Currently connected libp2p peers.
    pub connected_peers: IntGauge,
}

impl NodeMetrics {
    /// Register the node metrics next to `ledger`'s. Call once at startup.
    pub fn new(ledger: LedgerMetrics) -> Self {
        let registry = ledger.registry();

        let rpc_requests_total = IntCounterVec::new(
            Opts::new("rpc_requests_total", "JSON-RPC requests served"),
            &["method", "outcome"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(rpc_requests_total.clone()))
            .expect("metric registration");

        let rpc_latency_seconds = Histogram::with_opts(
            HistogramOpts::new("rpc_latency_seconds", "JSON-RPC handling latency in seconds")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 1.0]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(rpc_latency_seconds.clone()))
            .expect("metric registration");

        let connected_peers =
            IntGauge::new("connected_peers", "Number of currently connected P2P peers")
                .expect("metric creation");
        registry
            .register(Box::new(connected_peers.clone()))
            .expect("metric registration");

        Self {
            ledger,
            rpc_requests_total,
            rpc_latency_seconds,
            connected_peers,
        }
    }

    /// Text exposition of every metric in the shared registry.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        self.ledger.render()
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// `GET /metrics` in Prometheus text format.
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_and_ledger_metrics_share_one_exposition() {
        let ledger = LedgerMetrics::new();
        let metrics = NodeMetrics::new(ledger.clone());

        ledger.transactions_admitted_total.inc();
        metrics
            .rpc_requests_total
            .with_label_values(&["spore_send", "ok"])
            .inc();
        metrics.connected_peers.set(3);

        let text = metrics.encode().unwrap();
        assert!(text.contains("spore_transactions_admitted_total 1"));
        assert!(text.contains("spore_rpc_requests_total{method=\"spore_send\",outcome=\"ok\"} 1"));
        assert!(text.contains("spore_connected_peers 3"));
    }
}
