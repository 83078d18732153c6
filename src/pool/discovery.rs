//! Pool Discovery (C3).
//!
//! Crawls factory event logs in bounded block chunks (full scan on cold
//! start, incremental scan on every subsequent tick), resolves both
//! tokens of every new pool through the token registry, and refreshes
//! liquidity for the subset of pools that touch a known token.

use crate::contracts::{IStableFactory, IStablePool, IUniswapV2Factory, IUniswapV2Pair, IUniswapV3Factory, IUniswapV3Pool};
use crate::error::DiscoveryError;
use crate::pool::catalog::PoolCatalog;
use crate::token_registry::TokenRegistry;
use crate::types::{DiscoveredPool, VenueKind};
use alloy::primitives::Address;
use alloy::providers::Provider;
use alloy::rpc::types::Filter;
use alloy::sol_types::SolEvent;
use anyhow::Result;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const CHUNK_SIZE: u64 = 10_000;
const REFRESH_BATCH_SIZE: usize = 20;
const REFRESH_BATCH_COOLDOWN: Duration = Duration::from_millis(200);
const SAVE_EVERY_N_BATCHES: usize = 5;
/// §4.3 fallback: when neither token has a price, estimate TVL from the
/// raw liquidity scalar so the pool is not silently excluded. Flagged in
/// SPEC_FULL.md §9 as a crude heuristic, preserved as specified.
const DEGENERATE_LIQUIDITY_MULTIPLIER: f64 = 1000.0;

/// One configured discovery source, supplied by the operator via
/// `FACTORIES_JSON` (see `config::load_config`) since factory deployments
/// vary by network and are not something this crate should hardcode.
#[derive(Debug, Clone, Deserialize)]
pub struct FactoryConfig {
    pub venue_id: String,
    pub venue_kind: VenueKind,
    pub factory_address: Address,
    pub start_block: u64,
    /// v3 factories only: the fee tiers to probe when resolving a pool by
    /// token pair (unused for event-driven discovery itself).
    pub fee_tiers: Vec<u32>,
}

pub struct PoolDiscovery<P> {
    provider: Arc<P>,
    registry: Arc<TokenRegistry<P>>,
    catalog: Arc<PoolCatalog>,
    factories: Vec<FactoryConfig>,
    min_liquidity_usd: f64,
}

impl<P: Provider + 'static> PoolDiscovery<P> {
    pub fn new(
        provider: Arc<P>,
        registry: Arc<TokenRegistry<P>>,
        catalog: Arc<PoolCatalog>,
        factories: Vec<FactoryConfig>,
        min_liquidity_usd: f64,
    ) -> Self {
        Self {
            provider,
            registry,
            catalog,
            factories,
            min_liquidity_usd,
        }
    }

    /// Full scan of every configured factory from its start block to the
    /// current head, in `CHUNK_SIZE`-block windows.
    pub async fn full_scan(&self) -> Result<()> {
        let head = self.provider.get_block_number().await?;
        for factory in &self.factories {
            self.scan_factory(factory, factory.start_block, head).await;
        }
        self.catalog.set_last_scan_block(head);
        self.catalog.save()?;
        Ok(())
    }

    /// Incremental scan from the catalog's last scan block to the current
    /// head. A no-op on an empty range.
    pub async fn incremental_scan(&self) -> Result<u64> {
        let head = self.provider.get_block_number().await?;
        let from = self.catalog.last_scan_block() + 1;
        if from > head {
            return Ok(0);
        }

        let mut discovered = 0u64;
        for factory in &self.factories {
            discovered += self.scan_factory(factory, from, head).await;
        }
        self.catalog.set_last_scan_block(head);
        if discovered > 0 {
            self.catalog.save()?;
        }
        Ok(discovered)
    }

    /// Scan one factory across `[from, to]` in bounded chunks. RPC errors
    /// on a chunk are logged at debug and do not abort the remaining
    /// chunks (§4.3: "no abort on partial failure").
    async fn scan_factory(&self, factory: &FactoryConfig, from: u64, to: u64) -> u64 {
        if from > to {
            return 0;
        }

        let mut discovered = 0u64;
        let mut chunk_start = from;
        while chunk_start <= to {
            let chunk_end = (chunk_start + CHUNK_SIZE - 1).min(to);
            match self.scan_chunk(factory, chunk_start, chunk_end).await {
                Ok(n) => discovered += n,
                Err(e) => {
                    debug!(
                        factory = %factory.factory_address,
                        from = chunk_start,
                        to = chunk_end,
                        error = %e,
                        "chunk scan failed, continuing"
                    );
                }
            }
            chunk_start = chunk_end + 1;
        }
        discovered
    }

    async fn scan_chunk(&self, factory: &FactoryConfig, from: u64, to: u64) -> Result<u64, DiscoveryError> {
        let map_err = |source: anyhow::Error| DiscoveryError::LogScan {
            factory: factory.factory_address,
            from,
            to,
            source,
        };

        match factory.venue_kind {
            VenueKind::V3Cl => {
                let filter = Filter::new()
                    .address(factory.factory_address)
                    .from_block(from)
                    .to_block(to)
                    .event_signature(IUniswapV3Factory::PoolCreated::SIGNATURE_HASH);
                let logs = self.provider.get_logs(&filter).await.map_err(|e| map_err(e.into()))?;
                let mut n = 0u64;
                for log in logs {
                    if let Ok(decoded) = log.log_decode::<IUniswapV3Factory::PoolCreated>() {
                        let ev = decoded.inner.data;
                        if self
                            .try_insert_pool(
                                factory,
                                ev.pool,
                                ev.token0,
                                ev.token1,
                                ev.fee.to::<u32>(),
                            )
                            .await
                        {
                            n += 1;
                        }
                    }
                }
                Ok(n)
            }
            VenueKind::V2Amm => {
                let filter = Filter::new()
                    .address(factory.factory_address)
                    .from_block(from)
                    .to_block(to)
                    .event_signature(IUniswapV2Factory::PairCreated::SIGNATURE_HASH);
                let logs = self.provider.get_logs(&filter).await.map_err(|e| map_err(e.into()))?;
                let mut n = 0u64;
                for log in logs {
                    if let Ok(decoded) = log.log_decode::<IUniswapV2Factory::PairCreated>() {
                        let ev = decoded.inner.data;
                        // v2 fee is fixed at 30 bp; fee is not in the event.
                        if self.try_insert_pool(factory, ev.pair, ev.token0, ev.token1, 30).await {
                            n += 1;
                        }
                    }
                }
                Ok(n)
            }
            VenueKind::StableCl => {
                let filter = Filter::new()
                    .address(factory.factory_address)
                    .from_block(from)
                    .to_block(to)
                    .event_signature(IStableFactory::PoolCreated::SIGNATURE_HASH);
                let logs = self.provider.get_logs(&filter).await.map_err(|e| map_err(e.into()))?;
                let mut n = 0u64;
                for log in logs {
                    if let Ok(decoded) = log.log_decode::<IStableFactory::PoolCreated>() {
                        let ev = decoded.inner.data;
                        let fee = if ev.stable { 5 } else { 30 };
                        if self.try_insert_pool(factory, ev.pool, ev.token0, ev.token1, fee).await {
                            n += 1;
                        }
                    }
                }
                Ok(n)
            }
            VenueKind::Weighted | VenueKind::Aggregator => {
                // Weighted pools are registered with the vault out-of-band
                // (no per-pool factory event to crawl); aggregators have
                // no on-chain pool concept at all. Nothing to scan here.
                Ok(0)
            }
        }
    }

    /// Resolve both tokens and insert a new, inactive pool (liquidity is
    /// filled in by the next refresh pass). Unresolvable tokens drop the
    /// pool entirely per §4.3.
    async fn try_insert_pool(
        &self,
        factory: &FactoryConfig,
        pool_address: Address,
        token0: Address,
        token1: Address,
        fee_or_tick_spacing: u32,
    ) -> bool {
        let t0 = self.registry.resolve(token0).await;
        let t1 = self.registry.resolve(token1).await;
        let (Some(t0), Some(t1)) = (t0, t1) else {
            debug!(%pool_address, "unresolvable token, pool dropped");
            return false;
        };

        if self.catalog.contains(pool_address) {
            return false;
        }

        self.catalog.insert(DiscoveredPool {
            venue_id: factory.venue_id.clone(),
            venue_kind: factory.venue_kind,
            pool_address,
            token0,
            token1,
            token0_decimals: t0.decimals,
            token1_decimals: t1.decimals,
            fee_or_tick_spacing,
            liquidity: 0,
            reserve0: alloy::primitives::U256::ZERO,
            reserve1: alloy::primitives::U256::ZERO,
            liquidity_usd: 0.0,
            last_updated_millis: now_millis(),
            is_active: false,
        });
        true
    }

    /// Liquidity refresh: batched at `REFRESH_BATCH_SIZE` concurrency with
    /// an inter-batch cooldown, restricted to pools touching at least one
    /// known (priced) token.
    pub async fn refresh_liquidity(&self) -> Result<usize> {
        let relevant: Vec<DiscoveredPool> = self
            .catalog
            .iter_all()
            .into_iter()
            .filter(|p| self.registry.is_known(p.token0) || self.registry.is_known(p.token1))
            .collect();

        let mut refreshed = 0usize;
        for (batch_idx, batch) in relevant.chunks(REFRESH_BATCH_SIZE).enumerate() {
            let futures = batch.iter().map(|pool| self.refresh_one(pool.clone()));
            let results = futures::future::join_all(futures).await;
            refreshed += results.into_iter().filter(|r| *r).count();

            if batch_idx % SAVE_EVERY_N_BATCHES == SAVE_EVERY_N_BATCHES - 1 {
                if let Err(e) = self.catalog.save() {
                    warn!(error = %e, "periodic catalog save failed");
                }
            }
            tokio::time::sleep(REFRESH_BATCH_COOLDOWN).await;
        }

        if let Err(e) = self.catalog.save() {
            warn!(error = %e, "final catalog save failed after refresh");
        }
        Ok(refreshed)
    }

    async fn refresh_one(&self, mut pool: DiscoveredPool) -> bool {
        let result = match pool.venue_kind {
            VenueKind::V2Amm | VenueKind::StableCl => self.refresh_reserve_pool(&mut pool).await,
            VenueKind::V3Cl => self.refresh_cl_pool(&mut pool).await,
            VenueKind::Weighted | VenueKind::Aggregator => Ok(()),
        };

        if let Err(e) = result {
            debug!(pool = %pool.pool_address, error = %e, "liquidity refresh failed for this cycle");
            return false;
        }

        let t0_known = self.registry.is_known(pool.token0);
        let t1_known = self.registry.is_known(pool.token1);
        pool.recompute_active(self.min_liquidity_usd, t0_known, t1_known);
        pool.last_updated_millis = now_millis();
        self.catalog.insert(pool);
        true
    }

    async fn refresh_reserve_pool(&self, pool: &mut DiscoveredPool) -> Result<()> {
        if pool.venue_kind == VenueKind::StableCl {
            let contract = IStablePool::new(pool.pool_address, self.provider.clone());
            let reserves = contract.getReserves().call().await?;
            pool.reserve0 = alloy::primitives::U256::from(reserves.reserve0);
            pool.reserve1 = alloy::primitives::U256::from(reserves.reserve1);
        } else {
            let contract = IUniswapV2Pair::new(pool.pool_address, self.provider.clone());
            let reserves = contract.getReserves().call().await?;
            pool.reserve0 = alloy::primitives::U256::from(reserves.reserve0);
            pool.reserve1 = alloy::primitives::U256::from(reserves.reserve1);
        }

        let usd0 = self.token_value_usd(pool.token0, pool.reserve0, pool.token0_decimals);
        let usd1 = self.token_value_usd(pool.token1, pool.reserve1, pool.token1_decimals);
        pool.liquidity_usd = clamp_finite(usd0 + usd1);
        Ok(())
    }

    async fn refresh_cl_pool(&self, pool: &mut DiscoveredPool) -> Result<()> {
        let contract = IUniswapV3Pool::new(pool.pool_address, self.provider.clone());
        let liquidity = contract.liquidity().call().await?;
        pool.liquidity = liquidity;

        let usd0_known = self.registry.is_known(pool.token0);
        let usd1_known = self.registry.is_known(pool.token1);

        pool.liquidity_usd = if usd0_known || usd1_known {
            // Symmetric-side approximation: double whichever side we can
            // price, since a v3 position's two sides are worth roughly
            // the same at the current tick for a liquidity estimate.
            let priced_token = if usd0_known { pool.token0 } else { pool.token1 };
            let decimals = if usd0_known { pool.token0_decimals } else { pool.token1_decimals };
            let price = self.registry.get_known(priced_token).map(|t| t.price_usd).unwrap_or(0.0);
            let approx_amount = (liquidity as f64) / 10f64.powi(decimals as i32);
            clamp_finite(approx_amount * price * 2.0)
        } else {
            clamp_finite(liquidity as f64 * DEGENERATE_LIQUIDITY_MULTIPLIER)
        };
        Ok(())
    }

    fn token_value_usd(&self, token: Address, amount: alloy::primitives::U256, decimals: u8) -> f64 {
        self.registry.value_usd(token, amount, decimals)
    }
}

fn clamp_finite(v: f64) -> f64 {
    if v.is_finite() && v >= 0.0 {
        v
    } else {
        0.0
    }
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::clamp_finite;

    #[test]
    fn clamp_finite_rejects_nan_and_negative() {
        assert_eq!(clamp_finite(f64::NAN), 0.0);
        assert_eq!(clamp_finite(f64::INFINITY), 0.0);
        assert_eq!(clamp_finite(-1.0), 0.0);
        assert_eq!(clamp_finite(42.0), 42.0);
    }
}
