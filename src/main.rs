//! Flash-loan arbitrage engine entry point.
//!
//! Loads configuration, constructs the HTTP and push-subscription
//! providers, wires up the signer and the engine, and runs the poll
//! loop until `SIGTERM`/`SIGINT` asks it to stop.

use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use base_arb_engine::{config, ArbitrageEngine};
use clap::{Parser, Subcommand};
use futures::stream::StreamExt;
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "base-arb-engine", about = "Flash-loan arbitrage engine for Base")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Validate the environment and exit without starting the engine.
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .json()
        .init();

    let cli = Cli::parse();
    if matches!(cli.command, Some(Command::CheckConfig)) {
        return match config::check_config() {
            Ok(()) => Ok(()),
            Err(e) => {
                eprintln!("configuration error: {e:#}");
                std::process::exit(1);
            }
        };
    }

    if let Err(e) = run().await {
        tracing::error!(target: "engine::error", error = %e, "fatal error");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let config = config::load_config().context("failed to load configuration")?;
    info!(chain_id = config.chain_id, "configuration loaded");

    let provider = ProviderBuilder::new()
        .connect_http(config.rpc_url_http.parse().context("RPC_URL_HTTP is not a valid URL")?);
    let provider = Arc::new(provider);
    info!(block = provider.get_block_number().await.unwrap_or(0), "connected to RPC");

    let signer: PrivateKeySigner = config.signer_key.parse().context("SIGNER_KEY is not a valid private key")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_handler(shutdown_tx)?;

    let engine = ArbitrageEngine::new(config, provider, signer).await.context("failed to construct engine")?;
    engine.run(shutdown_rx).await
}

/// `SIGTERM`/`SIGINT` flip the shutdown watch so the poll loop exits
/// after its current cycle; `SIGHUP` just logs, as a marker for the
/// operator that a config reload was requested (full reload support is
/// future work — the engine doesn't currently support being rebuilt
/// in place).
fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) -> Result<()> {
    let mut signals = Signals::new([SIGTERM, SIGINT, SIGHUP]).context("failed to register signal handlers")?;
    tokio::spawn(async move {
        while let Some(signal) = signals.next().await {
            match signal {
                SIGTERM | SIGINT => {
                    info!(signal, "shutdown signal received");
                    let _ = shutdown_tx.send(true);
                    break;
                }
                SIGHUP => warn!("SIGHUP received, config reload is not yet supported"),
                _ => {}
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
compile_error!("signal-hook's Unix signal set requires a Unix target");
