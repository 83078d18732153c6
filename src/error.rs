//! Per-component error types.
//!
//! Library-internal failures are typed so callers can match on kind (see
//! the error handling design in SPEC_FULL.md §7). Application glue (config
//! loading, binaries, the engine's own `main`) uses `anyhow::Result` with
//! `.context(...)` instead, matching the rest of the crate.

use alloy::primitives::Address;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenRegistryError {
    #[error("token {0} has no configured or resolvable metadata")]
    Unresolvable(Address),
    #[error("rpc call failed while resolving {0}: {1}")]
    Rpc(Address, String),
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("factory {factory} log scan failed for blocks {from}..={to}: {source}")]
    LogScan {
        factory: Address,
        from: u64,
        to: u64,
        #[source]
        source: anyhow::Error,
    },
    #[error("unresolvable token in pool {0}, pool dropped")]
    UnresolvableToken(Address),
}

#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("venue {0} returned no liquidity for this pair")]
    NoLiquidity(String),
    #[error("adapter call failed for venue {venue}: {source}")]
    AdapterCall {
        venue: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("aggregator rate-limited (429), backing off")]
    RateLimited,
    #[error("aggregator request timed out")]
    Timeout,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RiskRejection {
    #[error("circuit breaker tripped")]
    CircuitBreakerTripped,
    #[error("hourly trade limit reached ({0} trades)")]
    HourlyLimitReached(u32),
    #[error("candidate pool liquidity ${0:.2} below floor ${1:.2}")]
    LiquidityTooLow(f64, f64),
    #[error("expected profit ${0:.2} is less than 2x gas cost ${1:.2}")]
    ProfitBelowGasFloor(f64, f64),
    #[error("drawdown {0:.4} ETH at or over cap {1:.4} ETH")]
    DrawdownCapped(f64, f64),
    #[error("route {0} is in cooldown for {1} more blocks")]
    RouteCoolingDown(String, u64),
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("preflight check failed: {0}")]
    PreflightFailed(String),
    #[error("static simulation reverted: {0}")]
    SimulationReverted(String),
    #[error("signer nonce gap detected, resetting from chain")]
    NonceGap,
    #[error("private relay submission failed: {0}")]
    RelaySubmissionFailed(String),
    #[error("public submission failed: {0}")]
    PublicSubmissionFailed(String),
    #[error("transaction {0} went stale waiting for a receipt")]
    Stale(String),
    #[error("transaction {0} reverted on-chain")]
    Reverted(String),
    #[error("signer misconfigured: {0}")]
    SignerMisconfigured(String),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to write snapshot to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot at {0} is stale or structurally invalid, full rescan required")]
    StaleOrInvalid(String),
}
