//! Locally tracked signer nonce (§4.10, §5). Writable only by the
//! execution pipeline — no other component touches it.

use alloy::primitives::Address;
use alloy::providers::Provider;
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

pub struct NonceTracker {
    signer: Address,
    current: AtomicU64,
}

impl NonceTracker {
    /// Seeds from the chain's pending transaction count.
    pub async fn new<P: Provider>(provider: &P, signer: Address) -> Result<Self> {
        let initial = provider.get_transaction_count(signer).pending().await?;
        Ok(Self { signer, current: AtomicU64::new(initial) })
    }

    /// The nonce to use for the next submission. Does not advance it —
    /// call `advance()` only after the transaction is actually sent.
    pub fn peek(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    pub fn advance(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
    }

    /// Re-seeds from the chain after a nonce-gap or "nonce too low" error.
    pub async fn reset<P: Provider>(&self, provider: &P) -> Result<u64> {
        let fresh = provider.get_transaction_count(self.signer).pending().await?;
        self.current.store(fresh, Ordering::SeqCst);
        warn!(signer = %self.signer, nonce = fresh, "nonce tracker reset from chain");
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_does_not_advance() {
        let tracker = NonceTracker { signer: Address::ZERO, current: AtomicU64::new(42) };
        assert_eq!(tracker.peek(), 42);
        assert_eq!(tracker.peek(), 42);
    }

    #[test]
    fn advance_increments_by_one() {
        let tracker = NonceTracker { signer: Address::ZERO, current: AtomicU64::new(42) };
        tracker.advance();
        assert_eq!(tracker.peek(), 43);
    }
}
