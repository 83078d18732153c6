//! Gas Oracle (C8): EIP-1559 base-fee tracking, next-block prediction,
//! and urgency-scaled fee proposals (§4.8).

use std::collections::VecDeque;

const HISTORY_CAPACITY: usize = 20;
const DEFAULT_GAS_LIMIT: u64 = 500_000;
const ACCELERATION_THRESHOLD: f64 = 0.10;
const LOW_PRIORITY_FEE_GWEI: f64 = 2.0;
const HIGH_PRIORITY_FEE_GWEI: f64 = 5.0;

#[derive(Debug, Clone, Copy)]
pub struct GasParams {
    pub base_fee_gwei: f64,
    pub priority_fee_gwei: f64,
    pub max_fee_gwei: f64,
}

#[derive(Debug, Clone, Copy)]
struct BlockSample {
    base_fee_gwei: f64,
    gas_used: u64,
    gas_limit: u64,
}

pub struct GasOracle {
    history: VecDeque<BlockSample>,
    gas_limit: u64,
}

impl GasOracle {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }

    pub fn observe_block(&mut self, base_fee_gwei: f64, gas_used: u64, gas_limit: u64) {
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(BlockSample { base_fee_gwei, gas_used, gas_limit });
    }

    /// `{baseFee, priorityFee, maxFee}` from the latest observed block.
    pub fn current_gas(&self) -> Option<GasParams> {
        let latest = self.history.back()?;
        let priority_fee_gwei = self.priority_fee_for_acceleration();
        Some(GasParams {
            base_fee_gwei: latest.base_fee_gwei,
            priority_fee_gwei,
            max_fee_gwei: latest.base_fee_gwei + priority_fee_gwei,
        })
    }

    fn priority_fee_for_acceleration(&self) -> f64 {
        if self.history.len() < 2 {
            return LOW_PRIORITY_FEE_GWEI;
        }
        let n = self.history.len();
        let prev = self.history[n - 2].base_fee_gwei;
        let latest = self.history[n - 1].base_fee_gwei;
        let delta = (latest - prev).abs();
        if prev > 0.0 && delta / prev > ACCELERATION_THRESHOLD {
            HIGH_PRIORITY_FEE_GWEI
        } else {
            LOW_PRIORITY_FEE_GWEI
        }
    }

    /// EIP-1559 base fee update rule: `delta = baseFee * excess/target / 8`,
    /// signed by whether the block used more or less than the target (half
    /// of its gas limit).
    pub fn predict_next_base_fee(&self) -> Option<f64> {
        let latest = self.history.back()?;
        let target = latest.gas_limit / 2;
        if target == 0 {
            return Some(latest.base_fee_gwei);
        }

        let gas_used = latest.gas_used as i128;
        let target = target as i128;
        let excess = gas_used - target;
        let delta = latest.base_fee_gwei * (excess as f64 / target as f64) / 8.0;

        Some((latest.base_fee_gwei + delta).max(0.0))
    }

    /// `urgency` in `[1, 5]`; priority fee scales linearly around urgency 3.
    pub fn optimal_params(&self, urgency: u8) -> Option<GasParams> {
        let base = self.current_gas()?;
        let urgency = urgency.clamp(1, 5) as f64;
        let priority_fee_gwei = base.priority_fee_gwei * (urgency / 3.0);
        Some(GasParams {
            base_fee_gwei: base.base_fee_gwei,
            priority_fee_gwei,
            max_fee_gwei: base.base_fee_gwei + priority_fee_gwei,
        })
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }
}

impl Default for GasOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_fee_escalates_on_acceleration() {
        let mut oracle = GasOracle::new();
        oracle.observe_block(1.0, 10_000_000, 30_000_000);
        oracle.observe_block(1.2, 10_000_000, 30_000_000); // +20% delta
        let gas = oracle.current_gas().unwrap();
        assert_eq!(gas.priority_fee_gwei, HIGH_PRIORITY_FEE_GWEI);
    }

    #[test]
    fn priority_fee_stays_low_without_acceleration() {
        let mut oracle = GasOracle::new();
        oracle.observe_block(1.0, 10_000_000, 30_000_000);
        oracle.observe_block(1.02, 10_000_000, 30_000_000); // +2% delta
        let gas = oracle.current_gas().unwrap();
        assert_eq!(gas.priority_fee_gwei, LOW_PRIORITY_FEE_GWEI);
    }

    #[test]
    fn predicts_base_fee_increase_above_target_usage() {
        let mut oracle = GasOracle::new();
        oracle.observe_block(1.0, 20_000_000, 30_000_000); // target 15M, excess 5M
        let next = oracle.predict_next_base_fee().unwrap();
        // delta = 1.0 * (5_000_000/15_000_000) / 8 = 0.04166...
        assert!((next - 1.0416666666666667).abs() < 1e-9);
    }

    #[test]
    fn predicts_base_fee_decrease_below_target_usage() {
        let mut oracle = GasOracle::new();
        oracle.observe_block(1.0, 5_000_000, 30_000_000); // target 15M, excess -10M
        let next = oracle.predict_next_base_fee().unwrap();
        assert!(next < 1.0);
    }

    #[test]
    fn optimal_params_scales_priority_fee_with_urgency() {
        let mut oracle = GasOracle::new();
        oracle.observe_block(1.0, 10_000_000, 30_000_000);
        let low = oracle.optimal_params(1).unwrap();
        let high = oracle.optimal_params(5).unwrap();
        assert!(high.priority_fee_gwei > low.priority_fee_gwei);
    }

    #[test]
    fn empty_history_yields_no_current_gas() {
        let oracle = GasOracle::new();
        assert!(oracle.current_gas().is_none());
    }
}
