//! Strategy search: turns live quotes into `ArbOpportunity` candidates
//! per the profit-accounting formula in SPEC_FULL.md §4.6.

use crate::quote::engine::{LegQuote, QuoteEngine};
use crate::strategy::curated::CuratedTables;
use crate::token_registry::TokenRegistry;
use crate::types::{ArbOpportunity, DiscoveredPool, StrategyKind, SwapLeg, TradePair, VenueKind};
use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use std::sync::Arc;

const SLIPPAGE_DENOMINATOR: u32 = 10_000;
const BREAK_EVEN_PLUS_ONE_BP_NUM: u64 = 10_001;

fn default_gas_estimate(kind: VenueKind) -> u64 {
    match kind {
        VenueKind::V2Amm => 90_000,
        VenueKind::V3Cl => 120_000,
        VenueKind::StableCl => 100_000,
        VenueKind::Weighted => 130_000,
        VenueKind::Aggregator => 150_000,
    }
}

fn gas_base_for_legs(num_legs: usize) -> u64 {
    if num_legs >= 3 {
        120_000
    } else {
        100_000
    }
}

pub struct StrategySearch<P> {
    quote_engine: Arc<QuoteEngine<P>>,
    registry: Arc<TokenRegistry<P>>,
    curated: CuratedTables,
    flash_premium_bps: u32,
    slippage_bps: u32,
    min_profit_usd: f64,
    gas_price_gwei: f64,
    top_k: usize,
}

impl<P: Provider + 'static> StrategySearch<P> {
    pub fn new(
        quote_engine: Arc<QuoteEngine<P>>,
        registry: Arc<TokenRegistry<P>>,
        curated: CuratedTables,
        flash_premium_bps: u32,
        slippage_bps: u32,
        min_profit_usd: f64,
        gas_price_gwei: f64,
        top_k: usize,
    ) -> Self {
        Self {
            quote_engine,
            registry,
            curated,
            flash_premium_bps,
            slippage_bps,
            min_profit_usd,
            gas_price_gwei,
            top_k,
        }
    }

    /// §4.6 DIRECT_ARB / DYNAMIC_ARB / LST_ARB / STABLE_ARB share this
    /// shape: borrow `A`, swap to `B` on the best venue, swap back to `A`
    /// on a *different* (venue, feeTier) than the first leg.
    pub async fn direct_arb(
        &self,
        pair: &TradePair,
        borrow_amounts: &[U256],
        strategy_kind: StrategyKind,
    ) -> Vec<ArbOpportunity> {
        let mut found = Vec::new();
        for &(borrow_asset, other_asset) in &[(pair.token_a, pair.token_b), (pair.token_b, pair.token_a)] {
            for &borrow_amount in borrow_amounts {
                if let Some(opp) = self
                    .two_leg_candidate(&pair.pools, borrow_asset, other_asset, borrow_amount, strategy_kind)
                    .await
                {
                    found.push(opp);
                }
            }
        }
        found.sort_by(|a, b| b.net_profit_usd.partial_cmp(&a.net_profit_usd).unwrap());
        found.truncate(self.top_k.max(1));
        found
    }

    async fn two_leg_candidate(
        &self,
        pools: &[DiscoveredPool],
        borrow_asset: Address,
        other_asset: Address,
        borrow_amount: U256,
        strategy_kind: StrategyKind,
    ) -> Option<ArbOpportunity> {
        let leg1_quotes = self.quote_engine.quote_pools(pools, borrow_asset, borrow_amount).await;
        let mut best: Option<(ArbOpportunity, f64)> = None;

        for leg1 in &leg1_quotes {
            let Some(pool1) = pools.iter().find(|p| p.pool_address == leg1.pool_address) else {
                continue;
            };
            let leg2_pools: Vec<DiscoveredPool> = pools
                .iter()
                .filter(|p| p.pool_address != pool1.pool_address)
                .cloned()
                .collect();
            let leg2_quotes = self.quote_engine.quote_pools(&leg2_pools, other_asset, leg1.amount_out).await;
            let Some(leg2) = leg2_quotes.into_iter().max_by_key(|q| q.amount_out) else {
                continue;
            };
            let Some(pool2) = pools.iter().find(|p| p.pool_address == leg2.pool_address) else {
                continue;
            };

            let Some(opp) = self.build_opportunity(
                strategy_kind,
                borrow_asset,
                borrow_amount,
                vec![
                    (pool1.clone(), borrow_asset, other_asset, borrow_amount, leg1.amount_out, false),
                    (pool2.clone(), other_asset, borrow_asset, leg1.amount_out, leg2.amount_out, true),
                ],
            ) else {
                continue;
            };

            if best.as_ref().map(|(_, np)| opp.net_profit_usd > *np).unwrap_or(true) {
                let np = opp.net_profit_usd;
                best = Some((opp, np));
            }
        }

        best.map(|(opp, _)| opp)
    }

    /// §4.6 TRIANGULAR_ARB: best quote on each of A→B, B→C, C→A.
    pub async fn triangular_arb(
        &self,
        triangle: (Address, Address, Address),
        pools_ab: &[DiscoveredPool],
        pools_bc: &[DiscoveredPool],
        pools_ca: &[DiscoveredPool],
        borrow_amounts: &[U256],
    ) -> Option<ArbOpportunity> {
        let (a, b, c) = triangle;
        let mut best: Option<ArbOpportunity> = None;

        for &borrow_amount in borrow_amounts {
            let Some(leg1) = self.quote_engine.best_quote(pools_ab, a, borrow_amount).await else {
                continue;
            };
            let Some(pool1) = pools_ab.iter().find(|p| p.pool_address == leg1.pool_address).cloned() else {
                continue;
            };

            let Some(leg2) = self.quote_engine.best_quote(pools_bc, b, leg1.amount_out).await else {
                continue;
            };
            let Some(pool2) = pools_bc.iter().find(|p| p.pool_address == leg2.pool_address).cloned() else {
                continue;
            };

            let Some(leg3) = self.quote_engine.best_quote(pools_ca, c, leg2.amount_out).await else {
                continue;
            };
            let Some(pool3) = pools_ca.iter().find(|p| p.pool_address == leg3.pool_address).cloned() else {
                continue;
            };

            let opp = self.build_opportunity(
                StrategyKind::TriangularArb,
                a,
                borrow_amount,
                vec![
                    (pool1, a, b, borrow_amount, leg1.amount_out, false),
                    (pool2, b, c, leg1.amount_out, leg2.amount_out, true),
                    (pool3, c, a, leg2.amount_out, leg3.amount_out, true),
                ],
            );

            if let Some(opp) = opp {
                if best.as_ref().map(|b| opp.net_profit_usd > b.net_profit_usd).unwrap_or(true) {
                    best = Some(opp);
                }
            }
        }

        best
    }

    /// §4.6 LST_ARB / STABLE_ARB: direct arb restricted to curated pairs,
    /// with strategy-specific borrow schedules.
    pub async fn lst_arb(&self, pair: &TradePair, borrow_amounts: &[U256]) -> Vec<ArbOpportunity> {
        if !self.curated.lst_pairs.iter().any(|(x, y)| {
            (*x, *y) == (pair.token_a, pair.token_b) || (*x, *y) == (pair.token_b, pair.token_a)
        }) {
            return Vec::new();
        }
        self.direct_arb(pair, borrow_amounts, StrategyKind::LstArb).await
    }

    pub async fn stable_arb(&self, pair: &TradePair, borrow_amounts: &[U256]) -> Vec<ArbOpportunity> {
        if !self.curated.stable_pairs.iter().any(|(x, y)| {
            (*x, *y) == (pair.token_a, pair.token_b) || (*x, *y) == (pair.token_b, pair.token_a)
        }) {
            return Vec::new();
        }
        self.direct_arb(pair, borrow_amounts, StrategyKind::StableArb).await
    }

    /// §4.6 DYNAMIC_ARB: direct arb over pairs not in the curated tables.
    pub async fn dynamic_arb(&self, pair: &TradePair, borrow_amounts: &[U256]) -> Vec<ArbOpportunity> {
        if self.curated.is_curated(pair.token_a, pair.token_b) {
            return Vec::new();
        }
        self.direct_arb(pair, borrow_amounts, StrategyKind::DynamicArb).await
    }

    /// Shared profit-accounting + leg assembly (§4.6).
    #[allow(clippy::too_many_arguments)]
    fn build_opportunity(
        &self,
        strategy_kind: StrategyKind,
        borrow_asset: Address,
        borrow_amount: U256,
        legs_in: Vec<(DiscoveredPool, Address, Address, U256, U256, bool)>,
    ) -> Option<ArbOpportunity> {
        let flash_fee = borrow_amount.checked_mul(U256::from(self.flash_premium_bps))? / U256::from(10_000u32);
        let total_cost = borrow_amount.checked_add(flash_fee)?;

        let total_return = legs_in.last()?.4;
        if total_return <= total_cost {
            return None;
        }
        let profit = total_return - total_cost;

        let borrow_info = self.registry.get_known(borrow_asset)?;
        let profit_bps = (profit.to::<u128>() as f64 * 10_000.0) / borrow_amount.to::<u128>().max(1) as f64;
        let profit_usd = self.registry.value_usd(borrow_asset, profit, borrow_info.decimals);

        let num_legs = legs_in.len();
        let gas_estimate: u64 =
            legs_in.iter().map(|(pool, ..)| default_gas_estimate(pool.venue_kind)).sum::<u64>()
                + gas_base_for_legs(num_legs);

        let gas_cost_usd = gas_estimate as f64 * self.gas_price_gwei * 1e-9 * self.eth_price_usd();
        let net_profit_usd = profit_usd - gas_cost_usd;

        if net_profit_usd < self.min_profit_usd {
            return None;
        }

        let mut legs = Vec::with_capacity(num_legs);
        for (i, (pool, token_in, token_out, amount_in, expected_out, is_marker)) in legs_in.into_iter().enumerate() {
            let is_final = i == num_legs - 1;
            let amount_out_min = if is_final {
                total_cost * U256::from(BREAK_EVEN_PLUS_ONE_BP_NUM) / U256::from(10_000u32)
            } else {
                expected_out * U256::from(SLIPPAGE_DENOMINATOR - self.slippage_bps) / U256::from(SLIPPAGE_DENOMINATOR)
            };

            legs.push(SwapLeg {
                venue_id: pool.venue_id.clone(),
                venue_kind: pool.venue_kind,
                pool_address: pool.pool_address,
                token_in,
                token_out,
                amount_in,
                amount_in_is_balance_marker: is_marker,
                expected_amount_out: expected_out,
                amount_out_min,
                fee_or_tick_spacing: pool.fee_or_tick_spacing,
                venue_extra_data: Vec::new(),
            });
        }

        Some(ArbOpportunity {
            strategy_kind,
            borrow_asset,
            borrow_amount,
            legs,
            expected_profit: profit,
            profit_bps,
            profit_usd,
            gas_estimate,
            gas_cost_usd,
            net_profit_usd,
            created_millis: now_millis(),
        })
    }

    fn eth_price_usd(&self) -> f64 {
        // WETH on Base; callers that need a different reference asset
        // should seed the registry accordingly.
        const WETH_BASE: &str = "0x4200000000000000000000000000000000000006";
        let addr: Address = WETH_BASE.parse().unwrap_or(Address::ZERO);
        self.registry.get_known(addr).map(|t| t.price_usd).unwrap_or(0.0)
    }
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_base_escalates_for_three_leg_routes() {
        assert_eq!(gas_base_for_legs(2), 100_000);
        assert_eq!(gas_base_for_legs(3), 120_000);
    }

    #[test]
    fn default_gas_estimate_is_ordered_by_venue_complexity() {
        assert!(default_gas_estimate(VenueKind::V2Amm) < default_gas_estimate(VenueKind::V3Cl));
        assert!(default_gas_estimate(VenueKind::V3Cl) < default_gas_estimate(VenueKind::Aggregator));
    }
}
