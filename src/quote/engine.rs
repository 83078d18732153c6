//! Bounded-concurrency quote dispatch.
//!
//! Every pool in a trade pair is quoted independently; concurrency is
//! capped (default 10, see SPEC_FULL.md §6 `QUOTE_CONCURRENCY`) so a
//! single noisy pair can't starve the RPC connection pool the rest of
//! the cycle depends on.

use crate::quote::adapter::{quote_leg, AdapterSet};
use crate::types::DiscoveredPool;
use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub struct QuoteEngine<P> {
    adapters: Arc<AdapterSet<P>>,
    concurrency: Arc<Semaphore>,
}

#[derive(Debug, Clone)]
pub struct LegQuote {
    pub pool_address: Address,
    pub amount_out: U256,
}

impl<P: Provider + 'static> QuoteEngine<P> {
    pub fn new(adapters: AdapterSet<P>, concurrency: usize) -> Self {
        Self {
            adapters: Arc::new(adapters),
            concurrency: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Quote every given pool for the same (token_in, amount_in) leg,
    /// dropping pools whose adapter call errors or returns no liquidity.
    pub async fn quote_pools(
        &self,
        pools: &[DiscoveredPool],
        token_in: Address,
        amount_in: U256,
    ) -> Vec<LegQuote> {
        let mut handles = Vec::with_capacity(pools.len());
        for pool in pools {
            let adapters = Arc::clone(&self.adapters);
            let permit = Arc::clone(&self.concurrency);
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire().await.ok()?;
                match quote_leg(&adapters, &pool, token_in, amount_in).await {
                    Ok(amount_out) => Some(LegQuote {
                        pool_address: pool.pool_address,
                        amount_out,
                    }),
                    Err(_) => None,
                }
            }));
        }

        let mut quotes = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(Some(q)) = handle.await {
                quotes.push(q);
            }
        }
        quotes
    }

    /// Best (highest amount_out) quote among a pool set, if any survived.
    pub async fn best_quote(
        &self,
        pools: &[DiscoveredPool],
        token_in: Address,
        amount_in: U256,
    ) -> Option<LegQuote> {
        self.quote_pools(pools, token_in, amount_in)
            .await
            .into_iter()
            .max_by_key(|q| q.amount_out)
    }
}
