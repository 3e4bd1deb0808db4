// Copyright (c) 2026 Spore Framework Contributors. MIT License.
// See LICENSE for details.

//! # Spore Node
//!
//! Entry point for the `spore-node` binary. Parses CLI arguments, wires the
//! ledger, store, contract engine, and libp2p transport into one
//! [`NodeContext`], then runs the gossip receive loop next to the HTTP API
//! and the metrics endpoint.
//!
//! Subcommands:
//!
//! - `run`     start the peer
//! - `init`    create the data directory and an account key
//! - `keygen`  print a fresh account key and its address
//! - `version` print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod p2p;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;

use spore_protocol::admission::{AdmissionPipeline, NodeContext};
use spore_protocol::contract::InMemoryContractEngine;
use spore_protocol::crypto::keys::SporeKeypair;
use spore_protocol::ledger::Ledger;
use spore_protocol::metrics::LedgerMetrics;
use spore_protocol::network::gossip::GossipService;
use spore_protocol::network::rpc::RpcGateway;
use spore_protocol::storage::SporeDB;

use cli::{Commands, LogFormat, SporeNodeCli};
use metrics::NodeMetrics;

const KEY_FILE: &str = "account.key";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = SporeNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Keygen => {
            keygen();
            Ok(())
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the peer: transport, gossip loop, API server, metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, args.log_format);

    tracing::info!(
        rpc_port = args.rpc_port,
        p2p_port = args.p2p_port,
        metrics_port = args.metrics_port,
        ordering_width = args.ordering_width,
        data_dir = %args.data_dir.display(),
        "starting spore-node"
    );

    // --- Persistent storage ---
    let db_path = args.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = SporeDB::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(
        path = %db_path.display(),
        transactions = db.transaction_count(),
        "database opened"
    );

    // --- Ledger core ---
    let ledger_metrics = LedgerMetrics::new();
    let node_metrics = Arc::new(NodeMetrics::new(ledger_metrics.clone()));
    let ctx = NodeContext::new(
        Arc::new(Ledger::new(args.ordering_width)),
        Arc::new(db.clone()),
        Arc::new(InMemoryContractEngine::new()),
        ledger_metrics,
    );
    let pipeline = AdmissionPipeline::new(ctx);

    // --- P2P ---
    let (transport, p2p_driver) = p2p::spawn(
        p2p::P2pConfig {
            listen_port: args.p2p_port,
            bootstrap: args.bootstrap.clone(),
        },
        Arc::clone(&node_metrics),
    )?;
    tracing::info!(
        peer_id = %transport.local_peer_id(),
        bootstrap = args.bootstrap.len(),
        "p2p identity ready"
    );
    let peer_count = transport.peer_counter();
    let gossip = Arc::new(GossipService::new(Arc::new(transport), pipeline.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let gossip_loop = {
        let gossip = Arc::clone(&gossip);
        tokio::spawn(async move { gossip.run(shutdown_rx).await })
    };

    // --- API server ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            spore_protocol::config::PROTOCOL_VERSION,
        ),
        gateway: RpcGateway::new(pipeline, gossip),
        peer_count,
        metrics: Arc::clone(&node_metrics),
    };
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!(addr = %api_addr, "RPC/API server listening");

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!(addr = %metrics_addr, "metrics server listening");

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "API server error");
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "metrics server error");
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = gossip_loop.await {
        tracing::warn!(error = %e, "gossip loop ended abnormally");
    }
    p2p_driver.abort();
    db.flush().context("failed to flush database")?;
    tracing::info!("spore-node stopped");
    Ok(())
}

/// Creates the data directory and writes a fresh account key into it.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("spore_node=info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let key_path = data_dir.join(KEY_FILE);
    if key_path.exists() && !args.force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            key_path.display()
        );
    }

    let keypair = SporeKeypair::generate();
    write_key(&key_path, &keypair)?;

    tracing::info!(
        address = %keypair.address(),
        key_path = %key_path.display(),
        "account key generated"
    );

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Account key    : {}", key_path.display());
    println!("  Address        : {}", keypair.address());

    Ok(())
}

fn write_key(path: &Path, keypair: &SporeKeypair) -> Result<()> {
    std::fs::write(path, hex::encode(keypair.secret_key_bytes()))
        .with_context(|| format!("failed to write key to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

fn keygen() {
    let keypair = SporeKeypair::generate();
    println!("secret_key {}", hex::encode(keypair.secret_key_bytes()));
    println!("address    {}", keypair.address());
}

fn print_version() {
    println!("spore-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol   {}", spore_protocol::config::PROTOCOL_VERSION);
    println!("topic      {}", spore_protocol::config::PUBSUB_TOPIC);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
