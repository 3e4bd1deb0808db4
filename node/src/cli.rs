//! # CLI Interface
//!
//! Command-line arguments for `spore-node`, via `clap` derive. Every `run`
//! flag has a `SPORE_*` environment fallback.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use spore_protocol::config::{
    DEFAULT_METRICS_PORT, DEFAULT_ORDERING_WIDTH, DEFAULT_P2P_PORT, DEFAULT_RPC_PORT,
};

/// Spore peer node.
///
/// Admits signed transactions into a local DAG ledger, gossips them to
/// other peers, and serves the JSON-RPC gateway and Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "spore-node",
    about = "Spore DAG ledger peer",
    version,
    propagate_version = true
)]
pub struct SporeNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the peer.
    Run(RunArgs),
    /// Create the data directory and a secp256k1 account key.
    Init(InitArgs),
    /// Print a fresh secp256k1 key and its address.
    Keygen,
    /// Print version information and exit.
    Version,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable output for local development.
    Pretty,
    /// JSON lines for log aggregation.
    Json,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding the transaction store.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "SPORE_DATA_DIR", default_value = ".spore")]
    pub data_dir: PathBuf,

    /// Port for the JSON-RPC and REST API.
    #[arg(long, env = "SPORE_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// TCP port for libp2p gossip.
    #[arg(long, env = "SPORE_P2P_PORT", default_value_t = DEFAULT_P2P_PORT)]
    pub p2p_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "SPORE_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Multiaddrs of peers to dial at startup, comma separated.
    #[arg(long, env = "SPORE_BOOTSTRAP", value_delimiter = ',')]
    pub bootstrap: Vec<String>,

    /// Ready nodes released per round of the ordering pass.
    #[arg(long, env = "SPORE_ORDERING_WIDTH", default_value_t = DEFAULT_ORDERING_WIDTH)]
    pub ordering_width: usize,

    #[arg(long, env = "SPORE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Data directory to initialize.
    #[arg(long, short = 'd', env = "SPORE_DATA_DIR", default_value = ".spore")]
    pub data_dir: PathBuf,

    /// Overwrite an existing key file.
    #[arg(long)]
    pub force: bool,
}
