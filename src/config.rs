//! Configuration loading.
//!
//! The process takes no CLI arguments for trading parameters; everything
//! is read from the environment (see SPEC_FULL.md §6). Optional variables
//! fall back to documented defaults instead of panicking, so a bare
//! `.env` with only the required secrets still boots the engine.

use crate::pool::FactoryConfig;
use alloy::primitives::Address;
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub chain_id: u64,

    pub rpc_url_http: String,
    pub rpc_url_push: Option<String>,
    pub rpc_url_backup: Option<String>,

    pub signer_key: String,
    pub contract_address: Option<Address>,
    pub aggregator_api_key: Option<String>,
    pub aggregator_base_url: Option<String>,

    pub min_profit_usd: f64,
    pub max_gas_price_gwei: f64,
    pub poll_interval_ms: u64,
    pub slippage_bps: u32,
    pub min_liquidity_usd: f64,
    pub flash_premium_bps: u32,

    pub enable_private_relay: bool,
    pub enable_circuit_breaker: bool,
    pub max_trades_per_hour: u32,
    pub max_drawdown_eth: f64,

    pub quote_concurrency: usize,
    pub liquidity_refresh_concurrency: usize,
    pub enable_multicall_prescreen: bool,
    pub uniswap_v3_quoter: Option<Address>,
    pub weighted_vault: Option<Address>,

    pub pool_snapshot_path: String,
    pub stats_snapshot_path: String,

    /// Discovery sources, deployment addresses vary per network so this
    /// is operator-supplied JSON rather than a hardcoded table.
    pub factories: Vec<FactoryConfig>,
    /// Assets the flash executor is willing to borrow (the graph only
    /// emits triangles rotated onto one of these).
    pub borrowable_assets: Vec<Address>,
    /// Private relay endpoint; `None` disables relay submission even if
    /// `enable_private_relay` is set, falling back straight to public.
    pub private_relay_url: Option<String>,
    pub eth_price_usd: f64,
    pub btc_price_usd: f64,

    /// Routers the mempool observer decodes pending calldata for.
    pub mempool_routers: Vec<(Address, String)>,
    pub enable_mempool_observer: bool,
}

#[derive(serde::Deserialize)]
struct RouterEntry {
    address: String,
    name: String,
}

const DEFAULT_CHAIN_ID: u64 = 8453; // Base

fn env_or_default<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

pub fn load_config() -> Result<EngineConfig> {
    dotenv::dotenv().ok();

    let rpc_url_http = env::var("RPC_URL_HTTP").context("RPC_URL_HTTP is required")?;
    let signer_key = env::var("SIGNER_KEY").context("SIGNER_KEY is required")?;

    let contract_address = env_optional("CONTRACT_ADDRESS")
        .map(|s| Address::from_str(&s).context("CONTRACT_ADDRESS is not a valid address"))
        .transpose()?;

    Ok(EngineConfig {
        chain_id: env_or_default("CHAIN_ID", DEFAULT_CHAIN_ID),

        rpc_url_http,
        rpc_url_push: env_optional("RPC_URL_PUSH"),
        rpc_url_backup: env_optional("RPC_URL_BACKUP"),

        signer_key,
        contract_address,
        aggregator_api_key: env_optional("AGGREGATOR_API_KEY"),
        aggregator_base_url: env_optional("AGGREGATOR_BASE_URL"),

        min_profit_usd: env_or_default("MIN_PROFIT_USD", 0.50),
        max_gas_price_gwei: env_or_default("MAX_GAS_PRICE_GWEI", 0.5),
        poll_interval_ms: env_or_default("POLL_INTERVAL_MS", 200),
        slippage_bps: env_or_default("SLIPPAGE_BPS", 30),
        min_liquidity_usd: env_or_default("MIN_LIQUIDITY_USD", 10_000.0),
        flash_premium_bps: env_or_default("FLASH_PREMIUM_BPS", 5),

        enable_private_relay: env_or_default("ENABLE_PRIVATE_RELAY", true),
        enable_circuit_breaker: env_or_default("ENABLE_CIRCUIT_BREAKER", true),
        max_trades_per_hour: env_or_default("MAX_TRADES_PER_HOUR", 100),
        max_drawdown_eth: env_or_default("MAX_DRAWDOWN_ETH", 5.0),

        quote_concurrency: env_or_default("QUOTE_CONCURRENCY", 10),
        liquidity_refresh_concurrency: env_or_default("LIQUIDITY_REFRESH_CONCURRENCY", 20),
        enable_multicall_prescreen: env_or_default("ENABLE_MULTICALL_PRESCREEN", true),
        uniswap_v3_quoter: env_optional("UNISWAP_V3_QUOTER")
            .map(|s| Address::from_str(&s).context("UNISWAP_V3_QUOTER is not a valid address"))
            .transpose()?,
        weighted_vault: env_optional("WEIGHTED_VAULT")
            .map(|s| Address::from_str(&s).context("WEIGHTED_VAULT is not a valid address"))
            .transpose()?,

        pool_snapshot_path: env_or_default("POOL_SNAPSHOT_PATH", "./data/pools.json".to_string()),
        stats_snapshot_path: env_or_default("STATS_SNAPSHOT_PATH", "./data/stats.json".to_string()),

        factories: parse_factories()?,
        borrowable_assets: parse_address_list("BORROWABLE_ASSETS")?,
        private_relay_url: env_optional("PRIVATE_RELAY_URL"),
        eth_price_usd: env_or_default("ETH_PRICE_USD", 2500.0),
        btc_price_usd: env_or_default("BTC_PRICE_USD", 60_000.0),

        mempool_routers: parse_routers()?,
        enable_mempool_observer: env_or_default("ENABLE_MEMPOOL_OBSERVER", true),
    })
}

fn parse_routers() -> Result<Vec<(Address, String)>> {
    let Some(json) = env_optional("MEMPOOL_ROUTERS_JSON") else {
        return Ok(Vec::new());
    };
    let entries: Vec<RouterEntry> = serde_json::from_str(&json).context("MEMPOOL_ROUTERS_JSON is not valid")?;
    entries
        .into_iter()
        .map(|e| {
            Address::from_str(&e.address)
                .map(|addr| (addr, e.name))
                .with_context(|| format!("MEMPOOL_ROUTERS_JSON contains an invalid address: {}", e.address))
        })
        .collect()
}

/// `FACTORIES_JSON` holds a JSON array of `FactoryConfig`; absent or
/// empty means discovery has no sources configured and the engine runs
/// with whatever the pool catalog snapshot already has on disk.
fn parse_factories() -> Result<Vec<FactoryConfig>> {
    match env_optional("FACTORIES_JSON") {
        Some(json) => serde_json::from_str(&json).context("FACTORIES_JSON is not valid"),
        None => Ok(Vec::new()),
    }
}

fn parse_address_list(key: &str) -> Result<Vec<Address>> {
    match env_optional(key) {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Address::from_str(s).with_context(|| format!("{key} contains an invalid address: {s}")))
            .collect(),
        None => Ok(Vec::new()),
    }
}

/// Validates the environment without starting the engine. Backs the
/// `--check-config` diagnostic subcommand.
pub fn check_config() -> Result<()> {
    let cfg = load_config()?;
    tracing::info!(
        chain_id = cfg.chain_id,
        rpc_url_http = %cfg.rpc_url_http,
        private_relay = cfg.enable_private_relay,
        circuit_breaker = cfg.enable_circuit_breaker,
        "configuration OK"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_default_parses_when_present() {
        env::set_var("TEST_ENV_OR_DEFAULT_PARSE", "42");
        let v: u64 = env_or_default("TEST_ENV_OR_DEFAULT_PARSE", 7);
        assert_eq!(v, 42);
        env::remove_var("TEST_ENV_OR_DEFAULT_PARSE");
    }

    #[test]
    fn env_or_default_falls_back_when_missing() {
        env::remove_var("TEST_ENV_OR_DEFAULT_MISSING");
        let v: u64 = env_or_default("TEST_ENV_OR_DEFAULT_MISSING", 7);
        assert_eq!(v, 7);
    }
}
