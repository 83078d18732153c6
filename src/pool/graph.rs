//! Pair/Triangle Graph (C4).
//!
//! Built fresh from a snapshot of the active pool set each cycle. Never
//! holds a reference across a suspension point — callers take a `Vec`
//! snapshot, build the graph, and move on (see SPEC_FULL.md design note
//! on cyclic references between strategy search and discovery).

use crate::types::DiscoveredPool;
use alloy::primitives::Address;
use std::collections::{HashMap, HashSet};

pub struct TradeGraph {
    pairs: Vec<crate::types::TradePair>,
    adjacency: HashMap<Address, HashSet<Address>>,
}

fn ordered(a: Address, b: Address) -> (Address, Address) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

impl TradeGraph {
    /// Build the graph from a snapshot of active pools.
    pub fn build(active_pools: &[DiscoveredPool]) -> Self {
        let mut by_pair: HashMap<(Address, Address), Vec<DiscoveredPool>> = HashMap::new();
        for pool in active_pools {
            let key = ordered(pool.token0, pool.token1);
            by_pair.entry(key).or_default().push(pool.clone());
        }

        let mut pairs = Vec::with_capacity(by_pair.len());
        let mut adjacency: HashMap<Address, HashSet<Address>> = HashMap::new();

        for ((a, b), pools) in by_pair {
            let best_liquidity_usd = pools.iter().map(|p| p.liquidity_usd).fold(0.0, f64::max);
            pairs.push(crate::types::TradePair {
                token_a: a,
                token_b: b,
                pools,
                best_liquidity_usd,
            });
            adjacency.entry(a).or_default().insert(b);
            adjacency.entry(b).or_default().insert(a);
        }

        pairs.sort_by(|x, y| y.best_liquidity_usd.partial_cmp(&x.best_liquidity_usd).unwrap());

        Self { pairs, adjacency }
    }

    pub fn all_pairs(&self) -> &[crate::types::TradePair] {
        &self.pairs
    }

    /// §4.4: pairs whose pool list touches >= 2 distinct venues, sorted
    /// by descending liquidity.
    pub fn arbitrageable_pairs(&self) -> Vec<&crate::types::TradePair> {
        self.pairs.iter().filter(|p| p.is_arbitrageable()).collect()
    }

    /// Triangles `(a, b, c)` with `a < b < c` and all three edges present,
    /// rotated so the first element is a flash-loan-borrowable asset.
    /// Triangles with no borrowable vertex are dropped. See SPEC_FULL.md
    /// §9 open question (b): this intentionally emits one rotation per
    /// triangle, not all three directional orderings.
    pub fn triangular_paths(&self, borrowable: &HashSet<Address>) -> Vec<(Address, Address, Address)> {
        let mut symbols: Vec<Address> = self.adjacency.keys().copied().collect();
        symbols.sort();

        let mut triangles = Vec::new();
        for (i, &a) in symbols.iter().enumerate() {
            for &b in &symbols[i + 1..] {
                if !self.adjacency.get(&a).map(|s| s.contains(&b)).unwrap_or(false) {
                    continue;
                }
                for &c in &symbols[i + 1..] {
                    if b >= c {
                        continue;
                    }
                    let ac = self.adjacency.get(&a).map(|s| s.contains(&c)).unwrap_or(false);
                    let bc = self.adjacency.get(&b).map(|s| s.contains(&c)).unwrap_or(false);
                    if ac && bc {
                        if let Some(rotated) = rotate_to_borrowable((a, b, c), borrowable) {
                            triangles.push(rotated);
                        }
                    }
                }
            }
        }
        triangles
    }
}

fn rotate_to_borrowable(
    (a, b, c): (Address, Address, Address),
    borrowable: &HashSet<Address>,
) -> Option<(Address, Address, Address)> {
    if borrowable.contains(&a) {
        Some((a, b, c))
    } else if borrowable.contains(&b) {
        Some((b, c, a))
    } else if borrowable.contains(&c) {
        Some((c, a, b))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VenueKind;
    use alloy::primitives::U256;

    fn pool(t0: u8, t1: u8, venue: &str, kind: VenueKind, liq_usd: f64) -> DiscoveredPool {
        let (token0, token1) = ordered(Address::with_last_byte(t0), Address::with_last_byte(t1));
        DiscoveredPool {
            venue_id: venue.to_string(),
            venue_kind: kind,
            pool_address: Address::with_last_byte(t0 ^ t1),
            token0,
            token1,
            token0_decimals: 18,
            token1_decimals: 18,
            fee_or_tick_spacing: 3000,
            liquidity: 0,
            reserve0: U256::ZERO,
            reserve1: U256::ZERO,
            liquidity_usd: liq_usd,
            last_updated_millis: 0,
            is_active: true,
        }
    }

    #[test]
    fn arbitrageable_pairs_require_two_venues() {
        let pools = vec![
            pool(1, 2, "v3-3000", VenueKind::V3Cl, 10_000.0),
            pool(1, 2, "stable", VenueKind::StableCl, 20_000.0),
            pool(3, 4, "v3-500", VenueKind::V3Cl, 5_000.0),
        ];
        let graph = TradeGraph::build(&pools);
        let arb = graph.arbitrageable_pairs();
        assert_eq!(arb.len(), 1);
        assert_eq!(arb[0].best_liquidity_usd, 20_000.0);
    }

    #[test]
    fn triangles_drop_when_no_vertex_is_borrowable() {
        let pools = vec![
            pool(1, 2, "a", VenueKind::V2Amm, 1.0),
            pool(2, 3, "b", VenueKind::V2Amm, 1.0),
            pool(1, 3, "c", VenueKind::V2Amm, 1.0),
        ];
        let graph = TradeGraph::build(&pools);

        let none_borrowable: HashSet<Address> = HashSet::new();
        assert!(graph.triangular_paths(&none_borrowable).is_empty());

        let mut borrowable = HashSet::new();
        borrowable.insert(Address::with_last_byte(2));
        let triangles = graph.triangular_paths(&borrowable);
        assert_eq!(triangles.len(), 1);
        assert_eq!(triangles[0].0, Address::with_last_byte(2));
    }
}
