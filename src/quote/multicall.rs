//! Multicall3 batch pre-screen (supplemented feature, optimization-only).
//!
//! Before fanning out one RPC call per pool, batch every v3-cl leg's
//! `quoteExactInputSingle` into a single `aggregate3` call with
//! `allowFailure: true`. Pools that fail the batched call are dropped
//! from the candidate set before the per-pool adapter fan-out even
//! starts; this never changes which opportunities are found, only how
//! many RPC round trips it costs to find them.

use crate::contracts::{IMulticall3, IQuoterV2, MULTICALL3_ADDRESS};
use crate::types::DiscoveredPool;
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::Provider;
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

pub struct MulticallPrescreen<P> {
    provider: Arc<P>,
    multicall_address: Address,
    quoter_address: Address,
}

impl<P: Provider + 'static> MulticallPrescreen<P> {
    pub fn new(provider: Arc<P>, quoter_address: Address) -> Result<Self> {
        let multicall_address = Address::from_str(MULTICALL3_ADDRESS).context("bad Multicall3 constant")?;
        Ok(Self {
            provider,
            multicall_address,
            quoter_address,
        })
    }

    /// Returns the indices (into `candidates`) of pools that produced a
    /// non-zero quote. Any RPC-level failure degrades to "keep everything"
    /// rather than dropping real opportunities on a flaky pre-screen.
    pub async fn surviving_indices(
        &self,
        candidates: &[(DiscoveredPool, Address, U256)],
    ) -> Vec<usize> {
        if candidates.is_empty() {
            return Vec::new();
        }

        match self.batch_quote(candidates).await {
            Ok(survivors) => survivors,
            Err(e) => {
                debug!(error = %e, "multicall prescreen failed, passing every candidate through");
                (0..candidates.len()).collect()
            }
        }
    }

    async fn batch_quote(&self, candidates: &[(DiscoveredPool, Address, U256)]) -> Result<Vec<usize>> {
        let calls: Vec<IMulticall3::Call3> = candidates
            .iter()
            .map(|(pool, token_in, amount_in)| {
                let token_out = pool.other_token(*token_in).unwrap_or(*token_in);
                let params = IQuoterV2::QuoteExactInputSingleParams {
                    tokenIn: *token_in,
                    tokenOut: token_out,
                    amountIn: *amount_in,
                    fee: alloy::primitives::Uint::from(pool.fee_or_tick_spacing),
                    sqrtPriceLimitX96: Default::default(),
                };
                let call_data = IQuoterV2::quoteExactInputSingleCall { params }.abi_encode();
                IMulticall3::Call3 {
                    target: self.quoter_address,
                    allowFailure: true,
                    callData: Bytes::from(call_data),
                }
            })
            .collect();

        let multicall = IMulticall3::new(self.multicall_address, self.provider.clone());
        let results = multicall.aggregate3(calls).call().await.context("aggregate3 eth_call failed")?;

        let mut survivors = Vec::with_capacity(candidates.len());
        for (i, result) in results.returnData.iter().enumerate() {
            if !result.success || result.returnData.len() < 32 {
                continue;
            }
            if let Ok(decoded) = IQuoterV2::quoteExactInputSingleCall::abi_decode_returns(&result.returnData) {
                if !decoded.amountOut.is_zero() {
                    survivors.push(i);
                }
            }
        }
        Ok(survivors)
    }
}
