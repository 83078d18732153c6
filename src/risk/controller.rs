//! Risk Controller (C7): circuit breaker, drawdown cap, and hourly trade
//! limit gating every candidate before it reaches execution (§4.7).

use crate::error::RiskRejection;
use crate::types::TradeRecord;
use std::collections::VecDeque;

const TRADE_HISTORY_CAPACITY: usize = 20;
const CONSECUTIVE_LOSS_TRIP: usize = 10;
const LOSS_RATE_TRIP: f64 = 0.70;
const PROFIT_TO_GAS_RATIO_FLOOR: f64 = 2.0;

pub struct RiskController {
    current_drawdown_eth: f64,
    max_drawdown_eth: f64,
    hourly_trade_count: u32,
    max_trades_per_hour: u32,
    circuit_breaker_tripped: bool,
    history: VecDeque<TradeRecord>,
    min_liquidity_usd: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub pool_liquidity_usd: f64,
    pub expected_profit_usd: f64,
    pub gas_cost_usd: f64,
}

impl RiskController {
    pub fn new(max_drawdown_eth: f64, max_trades_per_hour: u32, min_liquidity_usd: f64) -> Self {
        Self {
            current_drawdown_eth: 0.0,
            max_drawdown_eth,
            hourly_trade_count: 0,
            max_trades_per_hour,
            circuit_breaker_tripped: false,
            history: VecDeque::with_capacity(TRADE_HISTORY_CAPACITY),
            min_liquidity_usd,
        }
    }

    pub fn validate(&self, candidate: &Candidate) -> Result<(), RiskRejection> {
        if self.circuit_breaker_tripped {
            return Err(RiskRejection::CircuitBreakerTripped);
        }
        if self.hourly_trade_count >= self.max_trades_per_hour {
            return Err(RiskRejection::HourlyLimitReached(self.hourly_trade_count));
        }
        if candidate.pool_liquidity_usd < self.min_liquidity_usd {
            return Err(RiskRejection::LiquidityTooLow(candidate.pool_liquidity_usd, self.min_liquidity_usd));
        }
        if candidate.expected_profit_usd < candidate.gas_cost_usd * PROFIT_TO_GAS_RATIO_FLOOR {
            return Err(RiskRejection::ProfitBelowGasFloor(
                candidate.expected_profit_usd,
                candidate.gas_cost_usd * PROFIT_TO_GAS_RATIO_FLOOR,
            ));
        }
        if self.current_drawdown_eth >= self.max_drawdown_eth {
            return Err(RiskRejection::DrawdownCapped(self.current_drawdown_eth, self.max_drawdown_eth));
        }
        Ok(())
    }

    /// Record a finished trade's net profit and the gas it burned, then
    /// re-evaluate the breaker. `profit_eth` carries the sign: negative
    /// for losses (including a reverted trade that only paid gas).
    pub fn record(&mut self, profit_eth: f64, gas_cost_eth: f64, now_millis: u64) {
        if profit_eth < 0.0 {
            self.current_drawdown_eth += -profit_eth;
        } else {
            self.current_drawdown_eth = (self.current_drawdown_eth - profit_eth).max(0.0);
        }

        if self.history.len() == TRADE_HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(TradeRecord {
            finished_millis: now_millis,
            net_profit: profit_eth,
            gas_cost: gas_cost_eth,
        });

        self.hourly_trade_count += 1;
        self.reevaluate_breaker();
    }

    fn reevaluate_breaker(&mut self) {
        if self.circuit_breaker_tripped {
            return;
        }
        if self.current_drawdown_eth >= self.max_drawdown_eth {
            self.circuit_breaker_tripped = true;
            return;
        }

        let losses: Vec<bool> = self.history.iter().map(|t| t.is_loss()).collect();

        let max_consecutive = max_consecutive_true(&losses);
        if max_consecutive >= CONSECUTIVE_LOSS_TRIP {
            self.circuit_breaker_tripped = true;
            return;
        }

        if !losses.is_empty() {
            let loss_rate = losses.iter().filter(|l| **l).count() as f64 / losses.len() as f64;
            if losses.len() == TRADE_HISTORY_CAPACITY && loss_rate > LOSS_RATE_TRIP {
                self.circuit_breaker_tripped = true;
            }
        }
    }

    /// Hourly tick, independent of trade call order.
    pub fn reset_hourly_counter(&mut self) {
        self.hourly_trade_count = 0;
    }

    /// Manual operator reset; the breaker is one-way otherwise.
    pub fn reset_breaker(&mut self) {
        self.circuit_breaker_tripped = false;
        self.current_drawdown_eth = 0.0;
    }

    pub fn is_tripped(&self) -> bool {
        self.circuit_breaker_tripped
    }

    pub fn current_drawdown_eth(&self) -> f64 {
        self.current_drawdown_eth
    }
}

fn max_consecutive_true(values: &[bool]) -> usize {
    let mut max_run = 0;
    let mut run = 0;
    for &v in values {
        if v {
            run += 1;
            max_run = max_run.max(run);
        } else {
            run = 0;
        }
    }
    max_run
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> RiskController {
        RiskController::new(5.0, 100, 10_000.0)
    }

    fn good_candidate() -> Candidate {
        Candidate {
            pool_liquidity_usd: 50_000.0,
            expected_profit_usd: 10.0,
            gas_cost_usd: 1.0,
        }
    }

    #[test]
    fn rejects_liquidity_below_floor() {
        let c = controller();
        let mut cand = good_candidate();
        cand.pool_liquidity_usd = 1_000.0;
        assert!(matches!(c.validate(&cand), Err(RiskRejection::LiquidityTooLow(_, _))));
    }

    #[test]
    fn rejects_profit_below_2x_gas() {
        let c = controller();
        let mut cand = good_candidate();
        cand.expected_profit_usd = 1.5;
        cand.gas_cost_usd = 1.0;
        assert!(matches!(c.validate(&cand), Err(RiskRejection::ProfitBelowGasFloor(_, _))));
    }

    #[test]
    fn trips_on_ten_consecutive_losses_within_last_twenty() {
        let mut c = controller();
        for i in 0..10 {
            c.record(-0.01, 0.001, i);
        }
        assert!(c.is_tripped());
        assert!(matches!(c.validate(&good_candidate()), Err(RiskRejection::CircuitBreakerTripped)));
    }

    #[test]
    fn trips_on_drawdown_cap() {
        let mut c = controller();
        c.record(-5.0, 0.01, 0);
        assert!(c.is_tripped());
    }

    #[test]
    fn trips_when_loss_rate_exceeds_70_percent_of_last_twenty() {
        let mut c = controller();
        // 15 losses, 5 wins, interleaved so no run of 10 consecutive losses fires first.
        for i in 0..20u64 {
            if i % 4 == 3 {
                c.record(0.01, 0.001, i);
            } else {
                c.record(-0.01, 0.001, i);
            }
        }
        assert!(c.is_tripped());
    }

    #[test]
    fn breaker_is_one_way_until_manual_reset() {
        let mut c = controller();
        c.record(-5.0, 0.01, 0);
        assert!(c.is_tripped());
        c.record(1.0, 0.01, 1);
        assert!(c.is_tripped(), "breaker must not clear itself on a subsequent win");
        c.reset_breaker();
        assert!(!c.is_tripped());
    }

    #[test]
    fn hourly_reset_is_independent_of_record_calls() {
        let mut c = controller();
        c.record(1.0, 0.01, 0);
        c.record(1.0, 0.01, 1);
        assert_eq!(c.hourly_trade_count, 2);
        c.reset_hourly_counter();
        assert_eq!(c.hourly_trade_count, 0);
    }
}
