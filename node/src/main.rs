// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # MintForge Node
//!
//! Entry point for the `mintforge-node` binary. Parses CLI arguments,
//! initializes logging and metrics, and serves the HTTP API.
//!
//! The binary supports three subcommands:
//!
//! - `run`     starts the API and metrics servers
//! - `init`    creates the storage directories, optionally with a wallet
//! - `version` prints build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use mintforge_core::chain::{ChainConnector, RpcConnector, SimulatedChain};
use mintforge_core::keystore::Keystore;
use mintforge_core::MintForge;

use cli::{Commands, MintForgeCli};
use logging::{LogFormat, DEFAULT_FILTER};
use metrics::ForgeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = MintForgeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the API server and the metrics endpoint, then waits for a
/// shutdown signal.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(DEFAULT_FILTER, args.log_format);

    let config = args.forge_config();
    tracing::info!(
        bind = %args.bind,
        metrics_port = args.metrics_port,
        keystore = %config.keystore_dir.display(),
        registry = %config.registry_dir.display(),
        funding_mode = %config.funding_mode,
        simulate = args.simulate,
        "starting mintforge-node"
    );

    // --- Storage ---
    for dir in [&config.keystore_dir, &config.registry_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory: {}", dir.display()))?;
    }

    // --- Cluster access ---
    let connector: Arc<dyn ChainConnector> = if args.simulate {
        tracing::warn!("running against a simulated cluster; nothing reaches Solana");
        Arc::new(SimulatedChain::new())
    } else {
        Arc::new(RpcConnector::new(&config).context("failed to build RPC client")?)
    };
    let forge = MintForge::new(&config, connector).context("invalid configuration")?;

    // --- Metrics ---
    let forge_metrics = Arc::new(ForgeMetrics::new().context("failed to register metrics")?);

    // --- Application state ---
    let app_state = api::AppState {
        forge: Arc::new(forge),
        metrics: Arc::clone(&forge_metrics),
        faucet_url: config.faucet_fallback_url.clone(),
    };

    // --- API server ---
    let api_router = api::create_router(app_state, &args.allowed_origins);
    let api_listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("failed to bind API listener on {}", args.bind))?;
    tracing::info!("API server listening on {}", args.bind);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(forge_metrics);
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

    tracing::info!("mintforge-node stopped");
    Ok(())
}

/// Creates the keystore and registry directories. With `--generate-wallet`,
/// also writes a first wallet and prints its address.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("mintforge_node=info", LogFormat::Pretty);

    let storage = &args.storage;
    for dir in [&storage.keystore_dir, &storage.registry_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory: {}", dir.display()))?;
    }
    tracing::info!(
        keystore = %storage.keystore_dir.display(),
        registry = %storage.registry_dir.display(),
        "storage initialized"
    );

    println!("Storage initialized.");
    println!("  Keystore : {}", storage.keystore_dir.display());
    println!("  Registry : {}", storage.registry_dir.display());

    if args.generate_wallet {
        let keystore = Keystore::new(storage.keystore_dir.clone());
        let wallet = keystore.generate().context("failed to generate wallet")?;
        println!("  Wallet   : {}", wallet.address());
    }

    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("mintforge-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc          {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// If a handler cannot be installed, that branch never completes.
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
