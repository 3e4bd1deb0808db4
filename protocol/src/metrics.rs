//! # Ledger Metrics
//!
//! Prometheus counters and gauges for the admission path. This is where
//! failures that no caller ever sees end up: background persistence,
//! contract execution, gossip decoding.
//!
//! Everything lives in a dedicated registry with the `spore` prefix. The
//! node binary registers its own metrics into the same registry via
//! [`LedgerMetrics::registry`] and serves the lot on `/metrics`.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Metric handles for the ledger core. Cheap to clone.
#[derive(Clone)]
pub struct LedgerMetrics {
    registry: Registry,
    /// Transactions inserted into the ledger graph.
    pub transactions_admitted_total: IntCounter,
    /// Valid transactions the graph refused (duplicates, missing parents).
    pub transactions_rejected_total: IntCounter,
    /// Transactions that failed signature or id checks.
    pub validation_failures_total: IntCounter,
    pub gossip_decode_errors_total: IntCounter,
    /// Background writes that gave up after every retry.
    pub persistence_failures_total: IntCounter,
    pub contract_failures_total: IntCounter,
    pub envelopes_published_total: IntCounter,
    pub graph_nodes: IntGauge,
    pub graph_tips: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let metric = IntCounter::new(name, help).expect("metric creation");
    registry
        .register(Box::new(metric.clone()))
        .expect("metric registration");
    metric
}

fn gauge(registry: &Registry, name: &str, help: &str) -> IntGauge {
    let metric = IntGauge::new(name, help).expect("metric creation");
    registry
        .register(Box::new(metric.clone()))
        .expect("metric registration");
    metric
}

impl LedgerMetrics {
    /// Creates and registers all metrics. Call once per node.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("spore".into()), None)
            .expect("failed to create prometheus registry");

        Self {
            transactions_admitted_total: counter(
                &registry,
                "transactions_admitted_total",
                "Transactions inserted into the ledger graph",
            ),
            transactions_rejected_total: counter(
                &registry,
                "transactions_rejected_total",
                "Valid transactions refused by the ledger graph",
            ),
            validation_failures_total: counter(
                &registry,
                "validation_failures_total",
                "Transactions failing signature or id verification",
            ),
            gossip_decode_errors_total: counter(
                &registry,
                "gossip_decode_errors_total",
                "Inbound gossip messages that could not be decoded",
            ),
            persistence_failures_total: counter(
                &registry,
                "persistence_failures_total",
                "Background transaction writes that failed after retries",
            ),
            contract_failures_total: counter(
                &registry,
                "contract_failures_total",
                "Contract create or call operations that returned an error",
            ),
            envelopes_published_total: counter(
                &registry,
                "envelopes_published_total",
                "Gossip envelopes handed to the transport",
            ),
            graph_nodes: gauge(&registry, "graph_nodes", "Nodes in the ledger graph"),
            graph_tips: gauge(&registry, "graph_tips", "Tips in the ledger graph frontier"),
            registry,
        }
    }

    /// The registry, for registering additional collectors.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition of everything registered.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for LedgerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LedgerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerMetrics")
            .field("admitted", &self.transactions_admitted_total.get())
            .field("graph_nodes", &self.graph_nodes.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_prefixed_names() {
        let metrics = LedgerMetrics::new();
        metrics.transactions_admitted_total.inc();
        metrics.graph_nodes.set(3);

        let text = metrics.render().unwrap();
        assert!(text.contains("spore_transactions_admitted_total 1"));
        assert!(text.contains("spore_graph_nodes 3"));
        assert!(text.contains("spore_persistence_failures_total 0"));
    }

    #[test]
    fn instances_are_independent() {
        let a = LedgerMetrics::new();
        let b = LedgerMetrics::new();
        a.validation_failures_total.inc();
        assert_eq!(b.validation_failures_total.get(), 0);
    }
}
