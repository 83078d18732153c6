//! Wire-level structs passed from the decoder through the producer
//! channel to whatever is subscribed, plus the confirmation tracker used
//! to measure mempool lead time.

use alloy::primitives::{Address, B256, U256};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Calldata decode result — only the fields the decoder could extract.
#[derive(Debug, Clone)]
pub struct DecodedSwap {
    pub function_name: String,
    pub token_in: Option<Address>,
    pub token_out: Option<Address>,
    pub amount_in: Option<U256>,
    pub amount_out_min: Option<U256>,
    pub fee_tier: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct PendingSwap {
    pub tx_hash: B256,
    pub from: Address,
    pub router: Address,
    pub router_name: String,
    pub decoded: DecodedSwap,
    pub gas_price_gwei: f64,
    pub max_priority_fee_gwei: f64,
    pub seen_millis: u64,
}

#[derive(Debug, Clone)]
pub struct PoolUpdate {
    pub pool_address: Address,
    pub block_number: u64,
}

/// Published by the MEV heuristics pass; consumed by C10 for bidding.
#[derive(Debug, Clone, Copy, Default)]
pub struct MevRecommendation {
    pub use_private_relay: bool,
    pub raise_slippage: bool,
    pub recommended_slippage_bps: u32,
    pub use_flashbots: bool,
}

/// Single producer → channel → consumer event type. Subscribers read
/// from the receiving end of an `mpsc::Receiver<MempoolEvent>`; nothing
/// in the producer task ever calls subscriber code directly.
#[derive(Debug, Clone)]
pub enum MempoolEvent {
    Swap(PendingSwap),
    PoolUpdate(PoolUpdate),
    MevAdvisory(MevRecommendation),
}

/// Cross-references pending swaps we saw against confirmed blocks to
/// measure mempool visibility and lead time.
pub struct ConfirmationTracker {
    pending: HashMap<B256, (Instant, String)>,
    pub total_pending_seen: u64,
    pub total_confirmed: u64,
    pub total_lead_time_ms: u64,
    pub lead_time_samples: Vec<u64>,
}

impl ConfirmationTracker {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            total_pending_seen: 0,
            total_confirmed: 0,
            total_lead_time_ms: 0,
            lead_time_samples: Vec::new(),
        }
    }

    pub fn track(&mut self, tx_hash: B256, router_name: &str) {
        self.total_pending_seen += 1;
        self.pending.insert(tx_hash, (Instant::now(), router_name.to_string()));
    }

    pub fn check_block(&mut self, confirmed_hashes: &[B256]) -> Vec<(B256, u64, String)> {
        let mut matches = Vec::new();
        for hash in confirmed_hashes {
            if let Some((seen_at, router_name)) = self.pending.remove(hash) {
                let lead_time_ms = seen_at.elapsed().as_millis() as u64;
                self.total_confirmed += 1;
                self.total_lead_time_ms += lead_time_ms;
                self.lead_time_samples.push(lead_time_ms);
                matches.push((*hash, lead_time_ms, router_name));
            }
        }
        matches
    }

    pub fn cleanup(&mut self, max_age: Duration) {
        self.pending.retain(|_, (seen_at, _)| seen_at.elapsed() < max_age);
    }

    pub fn tracking_count(&self) -> usize {
        self.pending.len()
    }

    pub fn confirmation_rate(&self) -> f64 {
        if self.total_pending_seen == 0 {
            return 0.0;
        }
        self.total_confirmed as f64 / self.total_pending_seen as f64 * 100.0
    }

    pub fn median_lead_time_ms(&self) -> u64 {
        if self.lead_time_samples.is_empty() {
            return 0;
        }
        let mut sorted = self.lead_time_samples.clone();
        sorted.sort();
        sorted[sorted.len() / 2]
    }
}

impl Default for ConfirmationTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_rate_and_lead_time_track_matched_hashes() {
        let mut tracker = ConfirmationTracker::new();
        let hash = B256::with_last_byte(1);
        tracker.track(hash, "UniswapV3");
        assert_eq!(tracker.tracking_count(), 1);

        let matches = tracker.check_block(&[hash]);
        assert_eq!(matches.len(), 1);
        assert_eq!(tracker.tracking_count(), 0);
        assert_eq!(tracker.confirmation_rate(), 100.0);
    }

    #[test]
    fn unmatched_pending_swaps_leave_confirmation_rate_at_zero() {
        let mut tracker = ConfirmationTracker::new();
        tracker.track(B256::with_last_byte(1), "UniswapV3");
        let matches = tracker.check_block(&[B256::with_last_byte(2)]);
        assert!(matches.is_empty());
        assert_eq!(tracker.confirmation_rate(), 0.0);
    }
}
