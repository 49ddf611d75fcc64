// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # PayVault Node
//!
//! Entry point for the `payvault-node` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the persistent ledger and vault
//! store, and serves the HTTP API.
//!
//! The binary supports two subcommands:
//!
//! - `run`     — start the node
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::signal;

use payvault_contracts::{SledVaultStore, VaultProgram, VaultStore};
use payvault_protocol::{Ledger, LedgerDb, SystemClock};

use cli::{Commands, PayVaultCli};
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = PayVaultCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node: opens storage, then serves the API and metrics endpoints
/// until a shutdown signal arrives.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(&args.log_level, LogFormat::from_str_lossy(&args.log_format));

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting payvault-node"
    );

    // --- Persistent storage and vault program ---
    let program = open_program(&args)?;
    let db = program.ledger().clone();
    let store = program.store().clone();

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    let open_vaults = store.len().context("failed to count vaults")?;
    node_metrics.vaults_open.set(open_vaults as i64);
    tracing::info!(
        vaults = open_vaults,
        reserve = program.reserve(),
        max_payees = program.config().max_payees,
        max_schedules = program.config().max_schedules,
        "vault program ready"
    );

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            payvault_protocol::config::PROTOCOL_VERSION,
        ),
        network: "local".to_string(),
        started_at: chrono::Utc::now(),
        program: Arc::new(Mutex::new(program)),
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    store.flush().context("failed to flush vault store")?;
    db.flush().context("failed to flush ledger")?;
    tracing::info!("payvault-node stopped");
    Ok(())
}

/// Opens the ledger and vault store under `args.data_dir` and builds the
/// program over them. A `--minimum-reserve` flag is persisted first.
fn open_program(args: &cli::RunArgs) -> Result<api::NodeProgram> {
    let db_path = args.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;

    let mut db = LedgerDb::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    if let Some(reserve) = args.minimum_reserve {
        db.set_minimum_reserve(reserve)
            .context("failed to persist minimum reserve")?;
    }
    let store = SledVaultStore::open(&db).context("failed to open vault store")?;
    tracing::info!(
        path = %db_path.display(),
        accounts = db.account_count(),
        minimum_reserve = db.minimum_reserve(),
        "database opened"
    );

    let clock: api::SharedClock = Arc::new(SystemClock);
    Ok(VaultProgram::with_config(db, store, clock, args.vault_config()))
}

/// Prints version information to stdout.
fn print_version() {
    println!("payvault-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol      {}", payvault_protocol::config::PROTOCOL_VERSION);
    println!("rustc         {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// If a handler cannot be installed, that branch never fires and the other
/// one still can. On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
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
