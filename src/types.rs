//! Core data model shared across every component: tokens, pools, trade
//! graph, opportunities and their legs, execution records, and aggregate
//! engine statistics.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which protocol a pool belongs to. Each venue kind has its own event
/// schema, fee model, and quoting math; dispatch is by this tag rather
/// than by an inheritance hierarchy (see SPEC_FULL.md design notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VenueKind {
    /// Constant-product AMM, fixed 30 bp fee unless the pool says otherwise.
    V2Amm,
    /// Concentrated liquidity, tick/sqrtPriceX96 pricing, per-pool fee tier.
    V3Cl,
    /// Stable-swap curve that can run in "stable" or "volatile" (constant
    /// product) mode, e.g. Aerodrome-style factories.
    StableCl,
    /// Weighted pool (Balancer-style); fee is a pool parameter, not a tier.
    Weighted,
    /// Off-chain aggregator API; quotes come from HTTP, not eth_call.
    Aggregator,
}

impl VenueKind {
    pub fn is_onchain(&self) -> bool {
        !matches!(self, VenueKind::Aggregator)
    }
}

impl fmt::Display for VenueKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            VenueKind::V2Amm => "v2-amm",
            VenueKind::V3Cl => "v3-cl",
            VenueKind::StableCl => "stable-cl",
            VenueKind::Weighted => "weighted",
            VenueKind::Aggregator => "aggregator",
        };
        write!(f, "{s}")
    }
}

/// Address -> {symbol, decimals, usd price}. See C1 Token Registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub price_usd: f64,
}

impl TokenInfo {
    pub fn unknown(address: Address) -> Self {
        Self {
            address,
            symbol: "UNKNOWN".to_string(),
            decimals: 18,
            price_usd: 0.0,
        }
    }
}

/// A single discovered pool. Owned exclusively by the pool catalog (C2);
/// every other component only ever holds a read-only clone or reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredPool {
    pub venue_id: String,
    pub venue_kind: VenueKind,
    pub pool_address: Address,
    pub token0: Address,
    pub token1: Address,
    pub token0_decimals: u8,
    pub token1_decimals: u8,
    /// Fee in basis points for v2/v3/stable venues, or tick spacing for
    /// venues that key on spacing instead of a fee tier.
    pub fee_or_tick_spacing: u32,
    /// Opaque 128-bit liquidity scalar (v3/stable-CL only; zero for v2/weighted).
    #[serde(with = "u128_as_str")]
    pub liquidity: u128,
    /// Reserve-based venues only (v2-amm, weighted, some stable pools).
    pub reserve0: U256,
    pub reserve1: U256,
    pub liquidity_usd: f64,
    pub last_updated_millis: u64,
    pub is_active: bool,
}

impl DiscoveredPool {
    /// §3 invariant: isActive iff liquidity clears the floor and at least
    /// one token is known (price_usd > 0 is our proxy for "known").
    pub fn recompute_active(&mut self, min_liquidity_usd: f64, token0_known: bool, token1_known: bool) {
        self.is_active = self.liquidity_usd >= min_liquidity_usd && (token0_known || token1_known);
    }

    pub fn contains_token(&self, token: Address) -> bool {
        self.token0 == token || self.token1 == token
    }

    pub fn other_token(&self, token: Address) -> Option<Address> {
        if self.token0 == token {
            Some(self.token1)
        } else if self.token1 == token {
            Some(self.token0)
        } else {
            None
        }
    }
}

mod u128_as_str {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &u128, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&v.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Derived from the pool catalog: every unordered pair of tokens that
/// shares at least one pool, plus the pools backing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradePair {
    pub token_a: Address,
    pub token_b: Address,
    pub pools: Vec<DiscoveredPool>,
    pub best_liquidity_usd: f64,
}

impl TradePair {
    /// §4.4: arbitrageable means pools on at least 2 distinct venues.
    pub fn is_arbitrageable(&self) -> bool {
        let mut venues: Vec<&str> = self.pools.iter().map(|p| p.venue_id.as_str()).collect();
        venues.sort_unstable();
        venues.dedup();
        venues.len() >= 2
    }
}

/// Which family of strategy produced a candidate (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    DirectArb,
    TriangularArb,
    LstArb,
    StableArb,
    ZeroXArb,
    DynamicArb,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            StrategyKind::DirectArb => "DIRECT_ARB",
            StrategyKind::TriangularArb => "TRIANGULAR_ARB",
            StrategyKind::LstArb => "LST_ARB",
            StrategyKind::StableArb => "STABLE_ARB",
            StrategyKind::ZeroXArb => "ZEROX_ARB",
            StrategyKind::DynamicArb => "DYNAMIC_ARB",
        };
        write!(f, "{s}")
    }
}

/// One hop of an arbitrage route. `amount_in` of legs after the first is
/// a marker the on-chain contract resolves to "balance of tokenIn at
/// execution time" — the engine never tries to predict it exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapLeg {
    pub venue_id: String,
    pub venue_kind: VenueKind,
    /// Contract the execution pipeline targets for this hop: the pool
    /// itself for reserve/CL/weighted venues, or the router/aggregator
    /// target for venues that don't expose a directly-swappable pool.
    pub pool_address: Address,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub amount_in_is_balance_marker: bool,
    pub expected_amount_out: U256,
    pub amount_out_min: U256,
    pub fee_or_tick_spacing: u32,
    pub venue_extra_data: Vec<u8>,
}

/// A candidate closed-loop arbitrage trade, net of flash premium, slippage
/// and gas (§3, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbOpportunity {
    pub strategy_kind: StrategyKind,
    pub borrow_asset: Address,
    pub borrow_amount: U256,
    pub legs: Vec<SwapLeg>,
    pub expected_profit: U256,
    pub profit_bps: f64,
    pub profit_usd: f64,
    pub gas_estimate: u64,
    pub gas_cost_usd: f64,
    pub net_profit_usd: f64,
    pub created_millis: u64,
}

impl ArbOpportunity {
    pub fn age_millis(&self, now_millis: u64) -> u64 {
        now_millis.saturating_sub(self.created_millis)
    }

    pub fn label(&self) -> String {
        format!(
            "{}[{} legs, borrow={}]",
            self.strategy_kind,
            self.legs.len(),
            self.borrow_asset
        )
    }
}

/// One finished trade, retained in a bounded ring for risk analytics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub finished_millis: u64,
    /// Signed: negative on a loss (e.g. a reverted trade still burns gas).
    pub net_profit: f64,
    pub gas_cost: f64,
}

impl TradeRecord {
    pub fn is_loss(&self) -> bool {
        self.net_profit <= 0.0
    }
}

/// Process-wide counters, reset only at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStats {
    pub cycles: u64,
    pub opportunities_found: u64,
    pub opportunities_executed: u64,
    pub opportunities_succeeded: u64,
    pub cumulative_profit_usd: f64,
    pub total_cycle_millis: u64,
    pub errors_observed: u64,
}

impl EngineStats {
    pub fn average_cycle_millis(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.total_cycle_millis as f64 / self.cycles as f64
        }
    }

    pub fn record_cycle(&mut self, elapsed_millis: u64) {
        self.cycles += 1;
        self.total_cycle_millis += elapsed_millis;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(venue: &str, kind: VenueKind) -> DiscoveredPool {
        DiscoveredPool {
            venue_id: venue.to_string(),
            venue_kind: kind,
            pool_address: Address::ZERO,
            token0: Address::ZERO,
            token1: Address::with_last_byte(1),
            token0_decimals: 18,
            token1_decimals: 6,
            fee_or_tick_spacing: 3000,
            liquidity: 0,
            reserve0: U256::ZERO,
            reserve1: U256::ZERO,
            liquidity_usd: 50_000.0,
            last_updated_millis: 0,
            is_active: true,
        }
    }

    #[test]
    fn pair_needs_two_distinct_venues_to_be_arbitrageable() {
        let single = TradePair {
            token_a: Address::ZERO,
            token_b: Address::with_last_byte(1),
            pools: vec![pool("uni-v3-3000", VenueKind::V3Cl)],
            best_liquidity_usd: 50_000.0,
        };
        assert!(!single.is_arbitrageable());

        let two_venues = TradePair {
            pools: vec![pool("uni-v3-3000", VenueKind::V3Cl), pool("aero-stable", VenueKind::StableCl)],
            ..single
        };
        assert!(two_venues.is_arbitrageable());
    }

    #[test]
    fn inactive_pool_needs_liquidity_and_a_known_token() {
        let mut p = pool("uni-v3-3000", VenueKind::V3Cl);
        p.liquidity_usd = 0.0;
        p.recompute_active(10_000.0, true, true);
        assert!(!p.is_active);

        p.liquidity_usd = 25_000.0;
        p.recompute_active(10_000.0, false, false);
        assert!(!p.is_active, "neither token known means inactive regardless of TVL");

        p.recompute_active(10_000.0, true, false);
        assert!(p.is_active);
    }

    #[test]
    fn engine_stats_average_cycle_time() {
        let mut stats = EngineStats::default();
        stats.record_cycle(100);
        stats.record_cycle(300);
        assert_eq!(stats.cycles, 2);
        assert_eq!(stats.average_cycle_millis(), 200.0);
    }
}
