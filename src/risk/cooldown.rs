//! Route-level cooldown with escalating backoff (supplemented feature,
//! additive only — see SPEC_FULL.md's "Supplemented Features" section).
//!
//! Structurally dead routes (e.g. the same venue-pair gap that never
//! closes) quickly reach the cap while a one-off temporary failure
//! recovers fast.

use crate::error::RiskRejection;
use std::collections::HashMap;
use tracing::{debug, info};

type RouteKey = String;

struct CooldownEntry {
    last_failed_block: u64,
    cooldown_blocks: u64,
    failure_count: u32,
}

const ESCALATION_FACTOR: u64 = 5;
const DEFAULT_MAX_COOLDOWN: u64 = 1800;

pub struct RouteCooldown {
    entries: HashMap<RouteKey, CooldownEntry>,
    initial_cooldown: u64,
    max_cooldown: u64,
}

fn route_key(strategy_label: &str, leg_venues: &[String]) -> RouteKey {
    format!("{strategy_label}:{}", leg_venues.join("->"))
}

impl RouteCooldown {
    /// `initial_cooldown` in blocks; 0 disables cooldown entirely.
    pub fn new(initial_cooldown: u64) -> Self {
        Self {
            entries: HashMap::new(),
            initial_cooldown,
            max_cooldown: DEFAULT_MAX_COOLDOWN,
        }
    }

    pub fn check(&self, strategy_label: &str, leg_venues: &[String], current_block: u64) -> Result<(), RiskRejection> {
        if self.initial_cooldown == 0 {
            return Ok(());
        }
        let key = route_key(strategy_label, leg_venues);
        if let Some(entry) = self.entries.get(&key) {
            let expires_at = entry.last_failed_block + entry.cooldown_blocks;
            if current_block < expires_at {
                return Err(RiskRejection::RouteCoolingDown(key, expires_at - current_block));
            }
        }
        Ok(())
    }

    pub fn record_failure(&mut self, strategy_label: &str, leg_venues: &[String], block: u64) {
        if self.initial_cooldown == 0 {
            return;
        }
        let key = route_key(strategy_label, leg_venues);
        let entry = self.entries.entry(key.clone()).or_insert_with(|| CooldownEntry {
            last_failed_block: block,
            cooldown_blocks: 0,
            failure_count: 0,
        });

        entry.failure_count += 1;
        entry.last_failed_block = block;
        let escalated = self
            .initial_cooldown
            .saturating_mul(ESCALATION_FACTOR.saturating_pow(entry.failure_count.saturating_sub(1)));
        entry.cooldown_blocks = escalated.min(self.max_cooldown);

        debug!(route = %key, failures = entry.failure_count, cooldown_blocks = entry.cooldown_blocks, "route cooldown escalated");
    }

    pub fn record_success(&mut self, strategy_label: &str, leg_venues: &[String]) {
        let key = route_key(strategy_label, leg_venues);
        if self.entries.remove(&key).is_some() {
            info!(route = %key, "route cooldown reset after success");
        }
    }

    pub fn cleanup(&mut self, current_block: u64) {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| current_block < entry.last_failed_block + entry.cooldown_blocks);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "route cooldown cleanup");
        }
    }

    pub fn active_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn venues(a: &str, b: &str) -> Vec<String> {
        vec![a.to_string(), b.to_string()]
    }

    #[test]
    fn no_cooldown_initially() {
        let cd = RouteCooldown::new(10);
        assert!(cd.check("DIRECT_ARB", &venues("uni-v3-3000", "aero-stable"), 100).is_ok());
    }

    #[test]
    fn cooldown_after_failure_expires_on_schedule() {
        let mut cd = RouteCooldown::new(10);
        let v = venues("uni-v3-3000", "aero-stable");
        cd.record_failure("DIRECT_ARB", &v, 100);

        assert!(cd.check("DIRECT_ARB", &v, 109).is_err());
        assert!(cd.check("DIRECT_ARB", &v, 110).is_ok());
    }

    #[test]
    fn escalating_backoff_matches_5x_schedule_capped_at_max() {
        let mut cd = RouteCooldown::new(10);
        let v = venues("uni-v3-500", "uni-v3-3000");

        cd.record_failure("DIRECT_ARB", &v, 100);
        assert!(cd.check("DIRECT_ARB", &v, 109).is_err());
        assert!(cd.check("DIRECT_ARB", &v, 110).is_ok());

        cd.record_failure("DIRECT_ARB", &v, 200);
        assert!(cd.check("DIRECT_ARB", &v, 249).is_err());
        assert!(cd.check("DIRECT_ARB", &v, 250).is_ok());

        cd.record_failure("DIRECT_ARB", &v, 300);
        assert!(cd.check("DIRECT_ARB", &v, 549).is_err());
        assert!(cd.check("DIRECT_ARB", &v, 550).is_ok());

        cd.record_failure("DIRECT_ARB", &v, 600);
        assert!(cd.check("DIRECT_ARB", &v, 1849).is_err());
        assert!(cd.check("DIRECT_ARB", &v, 1850).is_ok());

        cd.record_failure("DIRECT_ARB", &v, 2000);
        assert!(cd.check("DIRECT_ARB", &v, 3799).is_err());
        assert!(cd.check("DIRECT_ARB", &v, 3800).is_ok());
    }

    #[test]
    fn success_resets_cooldown() {
        let mut cd = RouteCooldown::new(10);
        let v = venues("weth-usdc-v3", "weth-usdc-sushi");
        cd.record_failure("DIRECT_ARB", &v, 100);
        assert!(cd.check("DIRECT_ARB", &v, 101).is_err());

        cd.record_success("DIRECT_ARB", &v);
        assert!(cd.check("DIRECT_ARB", &v, 101).is_ok());
        assert_eq!(cd.active_count(), 0);
    }

    #[test]
    fn disabled_when_zero() {
        let mut cd = RouteCooldown::new(0);
        cd.record_failure("DIRECT_ARB", &venues("a", "b"), 100);
        assert!(cd.check("DIRECT_ARB", &venues("a", "b"), 100).is_ok());
    }

    #[test]
    fn cleanup_removes_only_expired_entries() {
        let mut cd = RouteCooldown::new(10);
        cd.record_failure("DIRECT_ARB", &venues("a", "b"), 100);
        cd.record_failure("TRIANGULAR_ARB", &venues("c", "d"), 200);
        assert_eq!(cd.active_count(), 2);

        cd.cleanup(111);
        assert_eq!(cd.active_count(), 1);

        cd.cleanup(211);
        assert_eq!(cd.active_count(), 0);
    }
}
