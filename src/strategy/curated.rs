//! Curated tables driving LST_ARB, STABLE_ARB and borrow-amount schedules.
//!
//! These are operator-configured, not discovered: an LST pair is only
//! "LST_ARB" because someone decided ankrETH/WETH belongs in that bucket,
//! not because the graph inferred it.

use alloy::primitives::{Address, U256};

/// ETH-like, BTC-like, and stablecoin borrow schedules (§4.6). Held as
/// raw-unit `U256` so the search layer never has to re-derive decimals.
#[derive(Debug, Clone)]
pub struct AssetClassSchedule {
    pub eth_like: Vec<U256>,
    pub btc_like: Vec<U256>,
    pub stable: Vec<U256>,
}

impl AssetClassSchedule {
    pub fn default_schedule() -> Self {
        let eth_like = [1u64, 5, 10, 50, 100]
            .into_iter()
            .map(|n| U256::from(n) * U256::from(10).pow(U256::from(18u8)))
            .collect();
        let btc_like = [10u64, 50, 100, 500] // 0.1, 0.5, 1, 5 at 8 decimals
            .into_iter()
            .map(|n| U256::from(n) * U256::from(10).pow(U256::from(6u8)))
            .collect();
        let stable = [5_000u64, 25_000, 100_000, 250_000]
            .into_iter()
            .map(|n| U256::from(n) * U256::from(10).pow(U256::from(6u8)))
            .collect();
        Self { eth_like, btc_like, stable }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CuratedTables {
    /// (base, lst) pairs for LST_ARB, both directions searched.
    pub lst_pairs: Vec<(Address, Address)>,
    /// Stablecoin pairs for STABLE_ARB.
    pub stable_pairs: Vec<(Address, Address)>,
}

impl CuratedTables {
    pub fn is_curated(&self, a: Address, b: Address) -> bool {
        self.lst_pairs.iter().any(|(x, y)| (*x, *y) == (a, b) || (*x, *y) == (b, a))
            || self.stable_pairs.iter().any(|(x, y)| (*x, *y) == (a, b) || (*x, *y) == (b, a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn btc_like_schedule_matches_the_0_1_to_5_btc_ladder_at_8_decimals() {
        let schedule = AssetClassSchedule::default_schedule();
        let expected: Vec<U256> = [1u64, 5, 10, 50]
            .into_iter()
            .map(|n| U256::from(n) * U256::from(10).pow(U256::from(7u8)))
            .collect();
        assert_eq!(schedule.btc_like, expected);
    }

    #[test]
    fn stable_schedule_is_unchanged_at_6_decimals() {
        let schedule = AssetClassSchedule::default_schedule();
        assert_eq!(schedule.stable[0], U256::from(5_000u64) * U256::from(10).pow(U256::from(6u8)));
    }
}
