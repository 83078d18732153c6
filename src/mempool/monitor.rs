//! Mempool Observer (C9) — observation loop.
//!
//! Subscribes to pending transactions over a WS push provider. For each
//! pending tx whose `to` matches a known router, decodes calldata and
//! publishes a `MempoolEvent::Swap`. Also tracks pool-level Swap/Sync
//! events for the pools the engine asks about and publishes
//! `MempoolEvent::PoolUpdate`. A lightweight MEV heuristics pass runs
//! over recent swaps and publishes `MempoolEvent::MevAdvisory`.
//!
//! This task is a pure producer: it never calls into subscriber logic
//! directly, only pushes onto an `mpsc::Sender<MempoolEvent>`. Connection
//! failures are retried with exponential backoff and never propagate to
//! the engine's main loop.

use alloy::consensus::Transaction as TransactionTrait;
use alloy::network::TransactionResponse;
use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::Filter;
use alloy::sol_types::SolEvent;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::contracts::{IUniswapV2Pair, IUniswapV3Pool};

use super::decoder;
use super::types::{DecodedSwap, MempoolEvent, MevRecommendation, PendingSwap, PoolUpdate};

const INITIAL_BACKOFF: Duration = Duration::from_secs(5);
const BACKOFF_MULTIPLIER: f64 = 1.5;
const BACKOFF_CAP: Duration = Duration::from_secs(60);
const RATE_LIMIT_BACKOFF_CAP: Duration = Duration::from_secs(180);
const MAX_RECONNECT_ATTEMPTS: u32 = 10;
const MAX_RECONNECT_ATTEMPTS_RATE_LIMITED: u32 = 20;

/// Large-value heuristic threshold, in the quoted token's raw units scaled
/// to a human amount — approximate, advisory only.
const LARGE_SWAP_THRESHOLD: f64 = 50_000.0;
const RECENT_CALLER_WINDOW: usize = 200;

pub struct MempoolObserverConfig {
    pub ws_url: String,
    pub routers: Vec<(Address, String)>,
    pub pools: Vec<Address>,
}

/// `http(s)://` → `ws(s)://`; already-ws URLs pass through untouched.
pub fn normalize_ws_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

/// Runs reconnecting with exponential backoff on failure, up to
/// `MAX_RECONNECT_ATTEMPTS` (`MAX_RECONNECT_ATTEMPTS_RATE_LIMITED` when the
/// most recent failure was a 429). A clean session reset resets the
/// counter. Once attempts are exhausted the observer gives up — advisory
/// only, so the engine runs on without it rather than treating this as fatal.
/// Also returns if the event channel's receiver has been dropped.
pub async fn run_observation(cfg: MempoolObserverConfig, event_tx: mpsc::Sender<MempoolEvent>) {
    let ws_url = normalize_ws_url(&cfg.ws_url);
    let router_lookup: HashMap<Address, String> = cfg.routers.iter().cloned().collect();

    let mut backoff = INITIAL_BACKOFF;
    let mut attempts = 0u32;
    loop {
        if event_tx.is_closed() {
            info!("mempool observer: event channel closed, stopping");
            return;
        }

        match run_session(&ws_url, &router_lookup, &cfg.pools, &event_tx).await {
            Ok(()) => {
                info!("mempool observer: session ended cleanly, reconnecting");
                backoff = INITIAL_BACKOFF;
                attempts = 0;
            }
            Err(e) => {
                let rate_limited = e.to_string().contains("429");
                let cap = if rate_limited { RATE_LIMIT_BACKOFF_CAP } else { BACKOFF_CAP };
                let max_attempts = if rate_limited { MAX_RECONNECT_ATTEMPTS_RATE_LIMITED } else { MAX_RECONNECT_ATTEMPTS };

                attempts += 1;
                if attempts > max_attempts {
                    warn!(error = %e, attempts = attempts - 1, max_attempts, "mempool observer: reconnects exhausted, giving up");
                    return;
                }

                warn!(
                    error = %e,
                    backoff_secs = backoff.as_secs(),
                    rate_limited,
                    attempt = attempts,
                    max_attempts,
                    "mempool observer session failed, backing off"
                );
                tokio::time::sleep(backoff).await;
                backoff = Duration::from_secs_f64((backoff.as_secs_f64() * BACKOFF_MULTIPLIER).min(cap.as_secs_f64()));
            }
        }
    }
}

async fn run_session(
    ws_url: &str,
    router_lookup: &HashMap<Address, String>,
    pools: &[Address],
    event_tx: &mpsc::Sender<MempoolEvent>,
) -> anyhow::Result<()> {
    let provider = ProviderBuilder::new().connect_ws(WsConnect::new(ws_url)).await?;

    let mut pending_stream = provider.subscribe_full_pending_transactions().await?.into_stream();

    let pool_filter = Filter::new()
        .address(pools.to_vec())
        .events([IUniswapV2Pair::Sync::SIGNATURE, IUniswapV3Pool::Swap::SIGNATURE]);
    let mut pool_stream = if pools.is_empty() {
        None
    } else {
        Some(provider.subscribe_logs(&pool_filter).await?.into_stream())
    };

    let mut recent_callers: VecDeque<(Address, u64)> = VecDeque::with_capacity(RECENT_CALLER_WINDOW);

    loop {
        tokio::select! {
            maybe_tx = pending_stream.next() => {
                let Some(tx) = maybe_tx else {
                    return Err(anyhow::anyhow!("pending transaction stream ended"));
                };
                let Some(router_name) = tx.to().and_then(|to| router_lookup.get(&to)).cloned() else {
                    continue;
                };
                let Some(decoded) = decoder::decode_calldata(tx.input()) else {
                    continue;
                };

                let swap = PendingSwap {
                    tx_hash: tx.tx_hash(),
                    from: tx.from(),
                    router: tx.to().unwrap_or_default(),
                    router_name,
                    decoded: decoded.clone(),
                    gas_price_gwei: TransactionTrait::gas_price(&tx).map(|gp| gp as f64 / 1e9).unwrap_or(0.0),
                    max_priority_fee_gwei: tx.max_priority_fee_per_gas().map(|pf| pf as f64 / 1e9).unwrap_or(0.0),
                    seen_millis: now_millis(),
                };

                if let Some(advisory) = mev_heuristics(&swap, &decoded, &mut recent_callers) {
                    let _ = event_tx.send(MempoolEvent::MevAdvisory(advisory)).await;
                }

                debug!(hash = %swap.tx_hash, router = %swap.router_name, function = %swap.decoded.function_name, "pending swap decoded");
                if event_tx.send(MempoolEvent::Swap(swap)).await.is_err() {
                    return Ok(());
                }
            }

            maybe_log = next_pool_log(&mut pool_stream) => {
                let Some(log) = maybe_log else { continue };
                let Some(block_number) = log.block_number else { continue };
                let update = PoolUpdate { pool_address: log.address(), block_number };
                if event_tx.send(MempoolEvent::PoolUpdate(update)).await.is_err() {
                    return Ok(());
                }
            }
        }
    }
}

async fn next_pool_log(
    stream: &mut Option<impl futures::Stream<Item = alloy::rpc::types::Log> + Unpin>,
) -> Option<alloy::rpc::types::Log> {
    match stream {
        Some(s) => s.next().await,
        None => std::future::pending().await,
    }
}

/// Flags a swap as large-value or from a caller seen repeatedly in the
/// recent window; either triggers a private-relay recommendation.
fn mev_heuristics(
    swap: &PendingSwap,
    decoded: &DecodedSwap,
    recent_callers: &mut VecDeque<(Address, u64)>,
) -> Option<MevRecommendation> {
    if recent_callers.len() == RECENT_CALLER_WINDOW {
        recent_callers.pop_front();
    }
    recent_callers.push_back((swap.from, swap.seen_millis));

    let repeated_caller = recent_callers.iter().filter(|(addr, _)| *addr == swap.from).count() > 1;

    let amount_in_approx = decoded
        .amount_in
        .map(|a| a.to_string().parse::<f64>().unwrap_or(0.0) / 1e18)
        .unwrap_or(0.0);
    let large_swap = amount_in_approx >= LARGE_SWAP_THRESHOLD;

    if !repeated_caller && !large_swap {
        return None;
    }

    Some(MevRecommendation {
        use_private_relay: large_swap,
        raise_slippage: repeated_caller,
        recommended_slippage_bps: if repeated_caller { 100 } else { 50 },
        use_flashbots: large_swap,
    })
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_http_and_https_to_ws() {
        assert_eq!(normalize_ws_url("http://node:8545"), "ws://node:8545");
        assert_eq!(normalize_ws_url("https://node:8545"), "wss://node:8545");
        assert_eq!(normalize_ws_url("ws://node:8545"), "ws://node:8545");
    }

    #[test]
    fn large_swap_triggers_private_relay_recommendation() {
        let mut recent = VecDeque::new();
        let decoded = DecodedSwap {
            function_name: "exactInputSingle".to_string(),
            token_in: None,
            token_out: None,
            amount_in: Some(alloy::primitives::U256::from(100_000_000u128) * alloy::primitives::U256::from(10u128.pow(18))),
            amount_out_min: None,
            fee_tier: None,
        };
        let swap = PendingSwap {
            tx_hash: Default::default(),
            from: Address::with_last_byte(9),
            router: Address::with_last_byte(1),
            router_name: "UniswapV3".to_string(),
            decoded: decoded.clone(),
            gas_price_gwei: 0.1,
            max_priority_fee_gwei: 0.01,
            seen_millis: 0,
        };
        let advisory = mev_heuristics(&swap, &decoded, &mut recent).unwrap();
        assert!(advisory.use_private_relay);
        assert!(advisory.use_flashbots);
    }

    #[test]
    fn repeated_caller_raises_slippage_recommendation() {
        let mut recent = VecDeque::new();
        let caller = Address::with_last_byte(7);
        let decoded = DecodedSwap {
            function_name: "exactInputSingle".to_string(),
            token_in: None,
            token_out: None,
            amount_in: Some(alloy::primitives::U256::from(1u64)),
            amount_out_min: None,
            fee_tier: None,
        };
        let make_swap = |seen_millis: u64| PendingSwap {
            tx_hash: Default::default(),
            from: caller,
            router: Address::with_last_byte(1),
            router_name: "UniswapV3".to_string(),
            decoded: decoded.clone(),
            gas_price_gwei: 0.1,
            max_priority_fee_gwei: 0.01,
            seen_millis,
        };

        assert!(mev_heuristics(&make_swap(0), &decoded, &mut recent).is_none());
        let advisory = mev_heuristics(&make_swap(1), &decoded, &mut recent).unwrap();
        assert!(advisory.raise_slippage);
    }
}
