//! Engine orchestrator: wires the token registry, pool catalog/discovery,
//! trade graph, quote engine, strategy search, risk controller, gas
//! oracle, mempool observer and execution pipeline into the single poll
//! loop described in SPEC_FULL.md §2 and §5.
//!
//! One `ArbitrageEngine` owns every component; `run()` is the only entry
//! point a binary needs to call after construction.

use crate::config::EngineConfig;
use crate::execution::{ExecutionOutcome, ExecutionPipeline};
use crate::gas::{GasOracle, GasParams};
use crate::mempool::{run_observation, MempoolEvent, MempoolObserverConfig, MevRecommendation};
use crate::persistence;
use crate::pool::{PoolCatalog, PoolDiscovery, TradeGraph};
use crate::quote::adapter::{AdapterSet, AggregatorAdapter, ReserveAdapter, V3Adapter, WeightedAdapter};
use crate::quote::engine::QuoteEngine;
use crate::risk::controller::Candidate;
use crate::risk::{RiskController, RouteCooldown};
use crate::strategy::curated::{AssetClassSchedule, CuratedTables};
use crate::strategy::StrategySearch;
use crate::token_registry::TokenRegistry;
use crate::types::{ArbOpportunity, EngineStats, StrategyKind, TradePair, VenueKind};
use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Deployed at the same address on every chain Balancer ships to; used
/// as the weighted-pool vault unless `WEIGHTED_VAULT` overrides it.
const DEFAULT_BALANCER_VAULT: &str = "0xBA12222222228d8Ba445958a75a0704d566BF2C";
/// Base's WETH predeploy, same address on every account.
const WETH_BASE: &str = "0x4200000000000000000000000000000000000006";
const USDC_BASE: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";

const TOP_K_PER_PAIR: usize = 3;
const INITIAL_ROUTE_COOLDOWN_BLOCKS: u64 = 5;
const LIQUIDITY_REFRESH_INTERVAL: Duration = Duration::from_secs(120);
const HOURLY_RESET_INTERVAL: Duration = Duration::from_secs(3600);
const SAVE_EVERY_N_CYCLES: u64 = 50;
const HIGH_URGENCY: u8 = 5;
const NORMAL_URGENCY: u8 = 3;

fn token_seeds() -> Vec<(Address, &'static str, u8, &'static str)> {
    vec![
        (Address::from_str(WETH_BASE).unwrap(), "WETH", 18, "eth"),
        (Address::from_str(USDC_BASE).unwrap(), "USDC", 6, "usd"),
    ]
}

pub struct ArbitrageEngine<P: Provider + Clone + 'static> {
    provider: Arc<P>,
    config: EngineConfig,
    registry: Arc<TokenRegistry<P>>,
    catalog: Arc<PoolCatalog>,
    discovery: PoolDiscovery<P>,
    strategy: Arc<StrategySearch<P>>,
    risk: RiskController,
    cooldown: RouteCooldown,
    gas_oracle: GasOracle,
    execution: ExecutionPipeline<P>,
    mempool_rx: mpsc::Receiver<MempoolEvent>,
    latest_mev: Option<MevRecommendation>,
    stats: EngineStats,
    borrowable: HashSet<Address>,
    cycles_since_save: u64,
}

impl<P: Provider + Clone + 'static> ArbitrageEngine<P> {
    pub async fn new(config: EngineConfig, provider: Arc<P>, signer: PrivateKeySigner) -> Result<Self> {
        let registry = Arc::new(TokenRegistry::new(provider.clone(), &token_seeds()));
        registry.update_prices(config.eth_price_usd, config.btc_price_usd);

        let catalog = Arc::new(PoolCatalog::new(config.pool_snapshot_path.clone()));

        let discovery = PoolDiscovery::new(
            provider.clone(),
            registry.clone(),
            catalog.clone(),
            config.factories.clone(),
            config.min_liquidity_usd,
        );

        let quoter_address = config.uniswap_v3_quoter.unwrap_or_default();
        let vault_address = match config.weighted_vault {
            Some(addr) => addr,
            None => Address::from_str(DEFAULT_BALANCER_VAULT).context("bad default vault constant")?,
        };
        let adapters = AdapterSet {
            reserve: ReserveAdapter,
            v3: V3Adapter::new(provider.clone(), quoter_address),
            weighted: WeightedAdapter::new(provider.clone(), vault_address),
            aggregator: AggregatorAdapter::new(
                config.aggregator_base_url.clone().unwrap_or_default(),
                config.aggregator_api_key.clone(),
                config.chain_id,
            ),
        };
        let quote_engine = Arc::new(QuoteEngine::new(adapters, config.quote_concurrency));

        let strategy = Arc::new(StrategySearch::new(
            quote_engine,
            registry.clone(),
            CuratedTables::default(),
            config.flash_premium_bps,
            config.slippage_bps,
            config.min_profit_usd,
            config.max_gas_price_gwei,
            TOP_K_PER_PAIR,
        ));

        let risk = RiskController::new(config.max_drawdown_eth, config.max_trades_per_hour, config.min_liquidity_usd);
        let cooldown = RouteCooldown::new(INITIAL_ROUTE_COOLDOWN_BLOCKS);
        let gas_oracle = GasOracle::new();

        let contract_address = config
            .contract_address
            .context("CONTRACT_ADDRESS is required to run the execution pipeline")?;
        let relay_url = if config.enable_private_relay { config.private_relay_url.clone() } else { None };
        let execution = ExecutionPipeline::new(
            (*provider).clone(),
            signer,
            contract_address,
            config.chain_id,
            config.max_gas_price_gwei,
            config.enable_private_relay,
            relay_url,
            config.eth_price_usd,
        )
        .await
        .context("failed to initialize execution pipeline")?;

        let (mempool_tx, mempool_rx) = mpsc::channel(256);
        if config.enable_mempool_observer {
            match config.rpc_url_push.clone() {
                Some(ws_url) => {
                    let observer_cfg = MempoolObserverConfig {
                        ws_url,
                        routers: config.mempool_routers.clone(),
                        pools: catalog.iter_all().into_iter().map(|p| p.pool_address).collect(),
                    };
                    tokio::spawn(run_observation(observer_cfg, mempool_tx));
                }
                None => warn!("ENABLE_MEMPOOL_OBSERVER is set but RPC_URL_PUSH is empty, skipping observer"),
            }
        }

        let borrowable: HashSet<Address> = if config.borrowable_assets.is_empty() {
            token_seeds().into_iter().map(|(addr, ..)| addr).collect()
        } else {
            config.borrowable_assets.iter().copied().collect()
        };

        let stats = persistence::load_stats(&config.stats_snapshot_path);

        info!(chain_id = config.chain_id, contract = %contract_address, "engine constructed");

        Ok(Self {
            provider,
            config,
            registry,
            catalog,
            discovery,
            strategy,
            risk,
            cooldown,
            gas_oracle,
            execution,
            mempool_rx,
            latest_mev: None,
            stats,
            borrowable,
            cycles_since_save: 0,
        })
    }

    /// Drives the poll loop until `shutdown` reports true. Every error
    /// at the cycle boundary is caught, logged, and counted — only
    /// construction failures are allowed to propagate out of `main`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if self.catalog.load().is_err() {
            info!("no usable pool catalog snapshot, running a full discovery scan before the first cycle");
            if let Err(e) = self.discovery.full_scan().await {
                warn!(error = %e, "initial full scan failed, starting with an empty catalog");
                self.stats.errors_observed += 1;
            }
            let _ = self.catalog.save();
        }

        let schedule = AssetClassSchedule::default_schedule();
        let mut last_liquidity_refresh = Instant::now();
        let mut last_hourly_reset = Instant::now();

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)) => {
                    self.run_cycle(&schedule).await;
                }
                Some(event) = self.mempool_rx.recv() => {
                    self.handle_mempool_event(event);
                }
            }

            if last_liquidity_refresh.elapsed() >= LIQUIDITY_REFRESH_INTERVAL {
                if let Err(e) = self.discovery.refresh_liquidity().await {
                    warn!(error = %e, "liquidity refresh failed");
                    self.stats.errors_observed += 1;
                }
                last_liquidity_refresh = Instant::now();
            }

            if last_hourly_reset.elapsed() >= HOURLY_RESET_INTERVAL {
                self.risk.reset_hourly_counter();
                last_hourly_reset = Instant::now();
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn run_cycle(&mut self, schedule: &AssetClassSchedule) {
        let cycle_start = Instant::now();

        let current_block = match self.provider.get_block_number().await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "get_block_number failed, skipping cycle");
                self.stats.errors_observed += 1;
                return;
            }
        };

        if let Err(e) = self.discovery.incremental_scan().await {
            warn!(error = %e, "incremental discovery scan failed");
            self.stats.errors_observed += 1;
        }

        self.observe_latest_block(current_block).await;
        self.cooldown.cleanup(current_block);

        let active_pools = self.catalog.iter_active();
        let graph = TradeGraph::build(&active_pools);

        let mut candidates = self.search_pairs(&graph, schedule).await;
        candidates.extend(self.search_triangles(&graph, schedule).await);

        self.stats.opportunities_found += candidates.len() as u64;
        candidates.sort_by(|a, b| b.net_profit_usd.partial_cmp(&a.net_profit_usd).unwrap());

        if let Some(best) = self.pick_executable(&candidates, current_block) {
            self.execute_opportunity(best, current_block).await;
        }

        self.stats.record_cycle(cycle_start.elapsed().as_millis() as u64);
        if self.cycles_since_save >= SAVE_EVERY_N_CYCLES {
            self.persist();
            self.cycles_since_save = 0;
        } else {
            self.cycles_since_save += 1;
        }
    }

    /// Feeds the gas oracle's EIP-1559 history from the latest block so
    /// `optimal_params` has something to extrapolate from.
    async fn observe_latest_block(&mut self, block_number: u64) {
        match self.provider.get_block_by_number(block_number.into()).await {
            Ok(Some(block)) => {
                let base_fee_gwei = block.header.base_fee_per_gas.unwrap_or(0) as f64 / 1e9;
                self.gas_oracle.observe_block(base_fee_gwei, block.header.gas_used, block.header.gas_limit);
            }
            Ok(None) => debug!(block_number, "block not yet available"),
            Err(e) => warn!(error = %e, block_number, "get_block_by_number failed"),
        }
    }

    async fn search_pairs(&self, graph: &TradeGraph, schedule: &AssetClassSchedule) -> Vec<ArbOpportunity> {
        let mut found = Vec::new();
        for pair in graph.arbitrageable_pairs() {
            let amounts = borrow_amounts_for(pair.token_a, &self.registry, schedule);
            found.extend(self.strategy.direct_arb(pair, amounts, StrategyKind::DirectArb).await);
            found.extend(self.strategy.lst_arb(pair, amounts).await);
            found.extend(self.strategy.stable_arb(pair, amounts).await);
            found.extend(self.strategy.dynamic_arb(pair, amounts).await);

            if pair.pools.iter().any(|p| p.venue_kind == VenueKind::Aggregator) {
                found.extend(self.strategy.direct_arb(pair, amounts, StrategyKind::ZeroXArb).await);
            }
        }
        found
    }

    async fn search_triangles(&self, graph: &TradeGraph, schedule: &AssetClassSchedule) -> Vec<ArbOpportunity> {
        let mut found = Vec::new();
        for (a, b, c) in graph.triangular_paths(&self.borrowable) {
            let pools_ab = pools_for(graph.all_pairs(), a, b);
            let pools_bc = pools_for(graph.all_pairs(), b, c);
            let pools_ca = pools_for(graph.all_pairs(), c, a);
            if pools_ab.is_empty() || pools_bc.is_empty() || pools_ca.is_empty() {
                continue;
            }
            let amounts = borrow_amounts_for(a, &self.registry, schedule);
            if let Some(opp) = self
                .strategy
                .triangular_arb((a, b, c), &pools_ab, &pools_bc, &pools_ca, amounts)
                .await
            {
                found.push(opp);
            }
        }
        found
    }

    /// First candidate, in descending profit order, that clears both the
    /// route cooldown and the risk controller. At most one trade executes
    /// per cycle (§5).
    fn pick_executable<'a>(&self, candidates: &'a [ArbOpportunity], current_block: u64) -> Option<&'a ArbOpportunity> {
        for opp in candidates {
            let label = opp.strategy_kind.to_string();
            let venues: Vec<String> = opp.legs.iter().map(|l| l.venue_id.clone()).collect();
            if self.cooldown.check(&label, &venues, current_block).is_err() {
                continue;
            }

            // Every leg's pool already cleared the liquidity floor when
            // discovery marked it active, so this check is a backstop
            // rather than the primary filter.
            let candidate = Candidate {
                pool_liquidity_usd: self.config.min_liquidity_usd,
                expected_profit_usd: opp.profit_usd,
                gas_cost_usd: opp.gas_cost_usd,
            };
            if let Err(rejection) = self.risk.validate(&candidate) {
                debug!(label = %label, reason = %rejection, "candidate rejected by risk controller");
                continue;
            }

            return Some(opp);
        }
        None
    }

    async fn execute_opportunity(&mut self, opportunity: &ArbOpportunity, current_block: u64) {
        let label = opportunity.strategy_kind.to_string();
        let venues: Vec<String> = opportunity.legs.iter().map(|l| l.venue_id.clone()).collect();

        let urgency = if self.latest_mev.map(|m| m.use_private_relay).unwrap_or(false) {
            HIGH_URGENCY
        } else {
            NORMAL_URGENCY
        };
        let gas = self.gas_oracle.optimal_params(urgency).unwrap_or(GasParams {
            base_fee_gwei: self.config.max_gas_price_gwei,
            priority_fee_gwei: 0.0,
            max_fee_gwei: self.config.max_gas_price_gwei,
        });

        self.stats.opportunities_executed += 1;
        let outcome = self.execution.execute(opportunity, gas, now_millis(), &mut self.risk).await;

        match outcome {
            ExecutionOutcome::Confirmed { tx_hash, gas_used, gas_cost_usd, profit_usd } => {
                self.stats.opportunities_succeeded += 1;
                self.stats.cumulative_profit_usd += profit_usd;
                self.cooldown.record_success(&label, &venues);
                info!(
                    target: "engine::trade",
                    strategy = %label,
                    borrow_asset = %opportunity.borrow_asset,
                    legs = opportunity.legs.len(),
                    expected_profit_usd = opportunity.profit_usd,
                    net_profit_usd = profit_usd,
                    gas_used,
                    gas_cost_usd,
                    tx_hash = %tx_hash,
                    "trade confirmed"
                );
            }
            ExecutionOutcome::Reverted { tx_hash, gas_cost_usd } => {
                self.cooldown.record_failure(&label, &venues, current_block);
                tracing::error!(target: "engine::error", %tx_hash, gas_cost_usd, "trade reverted on-chain");
            }
            ExecutionOutcome::Stale { tx_hash } => {
                self.cooldown.record_failure(&label, &venues, current_block);
                warn!(%tx_hash, "trade went stale waiting for a receipt");
            }
            ExecutionOutcome::Rejected { reason } => {
                debug!(reason = %reason, "execution pipeline rejected opportunity before submission");
            }
        }
    }

    fn handle_mempool_event(&mut self, event: MempoolEvent) {
        match event {
            MempoolEvent::MevAdvisory(rec) => {
                debug!(?rec, "mev advisory updated");
                self.latest_mev = Some(rec);
            }
            MempoolEvent::PoolUpdate(update) => {
                debug!(pool = %update.pool_address, block = update.block_number, "pool-level event observed");
            }
            MempoolEvent::Swap(swap) => {
                debug!(hash = %swap.tx_hash, router = %swap.router_name, function = %swap.decoded.function_name, "pending swap observed");
            }
        }
    }

    fn persist(&self) {
        if let Err(e) = self.catalog.save() {
            warn!(error = %e, "failed to save pool catalog snapshot");
        }
        if let Err(e) = persistence::save_stats(&self.config.stats_snapshot_path, &self.stats) {
            warn!(error = %e, "failed to save stats snapshot");
        }
    }

    /// §5 cancellation: discovery stops its tick and saves the catalog,
    /// the execution pipeline has already drained (the poll loop is
    /// strictly sequential, so no trade is ever in flight between
    /// cycles), and the mempool observer's task is left to end on its
    /// own once the channel it publishes to is dropped.
    async fn shutdown(&self) {
        info!("engine shutting down, persisting catalog and stats");
        self.persist();
    }
}

/// Picks the borrow-amount schedule whose decimal assumption matches the
/// asset being borrowed (18 for ETH-like, 8 for BTC-like, else stable).
fn borrow_amounts_for<P: Provider + 'static>(
    token: Address,
    registry: &TokenRegistry<P>,
    schedule: &AssetClassSchedule,
) -> &[U256] {
    match registry.get_known(token).map(|t| t.decimals) {
        Some(18) => &schedule.eth_like,
        Some(8) => &schedule.btc_like,
        _ => &schedule.stable,
    }
}

/// Every pool backing the unordered pair `(a, b)`, in the orientation the
/// engine's pair index already keyed them.
fn pools_for(pairs: &[TradePair], a: Address, b: Address) -> Vec<crate::types::DiscoveredPool> {
    pairs
        .iter()
        .find(|p| (p.token_a == a && p.token_b == b) || (p.token_a == b && p.token_b == a))
        .map(|p| p.pools.clone())
        .unwrap_or_default()
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DiscoveredPool, VenueKind};
    use alloy::providers::ProviderBuilder;

    fn test_registry() -> TokenRegistry<impl Provider> {
        let provider = ProviderBuilder::new().connect_http("http://127.0.0.1:8545".parse().unwrap());
        TokenRegistry::new(Arc::new(provider), &token_seeds())
    }

    #[test]
    fn borrow_amounts_pick_eth_schedule_for_18_decimal_tokens() {
        let registry = test_registry();
        let schedule = AssetClassSchedule::default_schedule();
        let weth = Address::from_str(WETH_BASE).unwrap();
        let amounts = borrow_amounts_for(weth, &registry, &schedule);
        assert_eq!(amounts, schedule.eth_like.as_slice());
    }

    #[test]
    fn borrow_amounts_fall_back_to_stable_schedule_for_unknown_tokens() {
        let registry = test_registry();
        let schedule = AssetClassSchedule::default_schedule();
        let random = Address::with_last_byte(200);
        let amounts = borrow_amounts_for(random, &registry, &schedule);
        assert_eq!(amounts, schedule.stable.as_slice());
    }

    fn pool(t0: Address, t1: Address, venue: &str) -> DiscoveredPool {
        DiscoveredPool {
            venue_id: venue.to_string(),
            venue_kind: VenueKind::V2Amm,
            pool_address: Address::with_last_byte(7),
            token0: t0,
            token1: t1,
            token0_decimals: 18,
            token1_decimals: 18,
            fee_or_tick_spacing: 30,
            liquidity: 0,
            reserve0: U256::ZERO,
            reserve1: U256::ZERO,
            liquidity_usd: 10_000.0,
            last_updated_millis: 0,
            is_active: true,
        }
    }

    #[test]
    fn pools_for_finds_a_pair_regardless_of_token_order() {
        let a = Address::with_last_byte(1);
        let b = Address::with_last_byte(2);
        let pairs = vec![TradePair {
            token_a: b,
            token_b: a,
            pools: vec![pool(b, a, "v")],
            best_liquidity_usd: 10_000.0,
        }];
        assert_eq!(pools_for(&pairs, a, b).len(), 1);
        assert_eq!(pools_for(&pairs, b, a).len(), 1);
    }

    #[test]
    fn pools_for_yields_empty_for_an_absent_pair() {
        let pairs: Vec<TradePair> = Vec::new();
        assert!(pools_for(&pairs, Address::with_last_byte(1), Address::with_last_byte(2)).is_empty());
    }
}
