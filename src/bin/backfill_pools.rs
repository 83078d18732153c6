//! Stand-alone pool discovery backfill.
//!
//! Runs a full factory-log scan from each configured `start_block` to
//! the current head and writes the resulting catalog snapshot, without
//! starting the poll loop. Useful for warming the snapshot before the
//! main binary's first cycle, or for re-backfilling after adding a new
//! factory to `FACTORIES_JSON`.

use alloy::providers::{Provider, ProviderBuilder};
use anyhow::{Context, Result};
use base_arb_engine::config;
use base_arb_engine::pool::{PoolCatalog, PoolDiscovery};
use base_arb_engine::token_registry::TokenRegistry;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::load_config().context("failed to load configuration")?;
    let provider = ProviderBuilder::new()
        .connect_http(config.rpc_url_http.parse().context("RPC_URL_HTTP is not a valid URL")?);
    let provider = Arc::new(provider);

    let head = provider.get_block_number().await.context("get_block_number failed")?;
    info!(head, factories = config.factories.len(), "starting full backfill");

    let registry = Arc::new(TokenRegistry::new(provider.clone(), &[]));
    registry.update_prices(config.eth_price_usd, config.btc_price_usd);
    let catalog = Arc::new(PoolCatalog::new(config.pool_snapshot_path.clone()));
    let discovery = PoolDiscovery::new(
        provider.clone(),
        registry.clone(),
        catalog.clone(),
        config.factories.clone(),
        config.min_liquidity_usd,
    );

    discovery.full_scan().await.context("full scan failed")?;
    let refreshed = discovery.refresh_liquidity().await.context("liquidity refresh failed")?;

    info!(pools = catalog.len(), refreshed, "backfill complete");
    Ok(())
}
