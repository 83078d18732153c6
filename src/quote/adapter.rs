//! Per-venue quoting math (§4.5).
//!
//! Reserve-based venues (v2-amm, stable-cl in volatile mode) are quoted
//! with on-hand reserves — no RPC round trip. Concentrated-liquidity and
//! weighted pools need a live on-chain call; aggregators need an HTTP
//! round trip. All five return the same `U256` amount-out so the search
//! layer never needs to know which one it asked.

use crate::contracts::{IQuoterV2, IWeightedPool, IWeightedVault};
use crate::error::QuoteError;
use crate::types::{DiscoveredPool, VenueKind};
use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait VenueAdapter: Send + Sync {
    async fn quote(&self, pool: &DiscoveredPool, token_in: Address, amount_in: U256) -> Result<U256, QuoteError>;
}

/// x*y=k with a basis-point fee taken off the input. Shared by v2-amm
/// and stable-cl pools running in volatile mode.
pub fn constant_product_out(
    amount_in: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee_bps: u32,
) -> Option<U256> {
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return None;
    }
    let fee_denominator = U256::from(10_000u32);
    let amount_in_after_fee = amount_in.checked_mul(U256::from(10_000u32 - fee_bps.min(10_000)))?;
    let numerator = amount_in_after_fee.checked_mul(reserve_out)?;
    let denominator = reserve_in
        .checked_mul(fee_denominator)?
        .checked_add(amount_in_after_fee)?;
    if denominator.is_zero() {
        return None;
    }
    Some(numerator / denominator)
}

pub struct ReserveAdapter;

#[async_trait]
impl VenueAdapter for ReserveAdapter {
    async fn quote(&self, pool: &DiscoveredPool, token_in: Address, amount_in: U256) -> Result<U256, QuoteError> {
        let (reserve_in, reserve_out) = if token_in == pool.token0 {
            (pool.reserve0, pool.reserve1)
        } else {
            (pool.reserve1, pool.reserve0)
        };
        constant_product_out(amount_in, reserve_in, reserve_out, pool.fee_or_tick_spacing)
            .ok_or_else(|| QuoteError::NoLiquidity(pool.venue_id.clone()))
    }
}

pub struct V3Adapter<P> {
    provider: Arc<P>,
    quoter_address: Address,
}

impl<P: Provider + 'static> V3Adapter<P> {
    pub fn new(provider: Arc<P>, quoter_address: Address) -> Self {
        Self { provider, quoter_address }
    }
}

#[async_trait]
impl<P: Provider + 'static> VenueAdapter for V3Adapter<P> {
    async fn quote(&self, pool: &DiscoveredPool, token_in: Address, amount_in: U256) -> Result<U256, QuoteError> {
        let token_out = pool
            .other_token(token_in)
            .ok_or_else(|| QuoteError::NoLiquidity(pool.venue_id.clone()))?;

        let quoter = IQuoterV2::new(self.quoter_address, self.provider.clone());
        let params = IQuoterV2::QuoteExactInputSingleParams {
            tokenIn: token_in,
            tokenOut: token_out,
            amountIn: amount_in,
            fee: alloy::primitives::Uint::from(pool.fee_or_tick_spacing),
            sqrtPriceLimitX96: Default::default(),
        };

        let result = quoter
            .quoteExactInputSingle(params)
            .call()
            .await
            .map_err(|e| QuoteError::AdapterCall {
                venue: pool.venue_id.clone(),
                source: e.into(),
            })?;

        if result.amountOut.is_zero() {
            return Err(QuoteError::NoLiquidity(pool.venue_id.clone()));
        }
        Ok(result.amountOut)
    }
}

pub struct WeightedAdapter<P> {
    provider: Arc<P>,
    vault_address: Address,
}

impl<P: Provider + 'static> WeightedAdapter<P> {
    pub fn new(provider: Arc<P>, vault_address: Address) -> Self {
        Self { provider, vault_address }
    }
}

#[async_trait]
impl<P: Provider + 'static> VenueAdapter for WeightedAdapter<P> {
    async fn quote(&self, pool: &DiscoveredPool, token_in: Address, amount_in: U256) -> Result<U256, QuoteError> {
        let map_err = |source: anyhow::Error| QuoteError::AdapterCall {
            venue: pool.venue_id.clone(),
            source,
        };

        let weighted = IWeightedPool::new(pool.pool_address, self.provider.clone());
        let pool_id = weighted.getPoolId().call().await.map_err(|e| map_err(e.into()))?;
        let weights = weighted.getNormalizedWeights().call().await.map_err(|e| map_err(e.into()))?;
        let swap_fee = weighted.getSwapFeePercentage().call().await.map_err(|e| map_err(e.into()))?;

        let vault = IWeightedVault::new(self.vault_address, self.provider.clone());
        let tokens_result = vault.getPoolTokens(pool_id).call().await.map_err(|e| map_err(e.into()))?;

        let idx_in = tokens_result
            .tokens
            .iter()
            .position(|t| *t == token_in)
            .ok_or_else(|| QuoteError::NoLiquidity(pool.venue_id.clone()))?;
        let idx_out = tokens_result
            .tokens
            .iter()
            .position(|t| *t != token_in)
            .ok_or_else(|| QuoteError::NoLiquidity(pool.venue_id.clone()))?;

        let balance_in = balance_f64(tokens_result.balances[idx_in]);
        let balance_out = balance_f64(tokens_result.balances[idx_out]);
        let weight_in = weight_f64(weights[idx_in]);
        let weight_out = weight_f64(weights[idx_out]);
        let fee_frac = weight_f64(swap_fee);

        if balance_in <= 0.0 || balance_out <= 0.0 || weight_out <= 0.0 {
            return Err(QuoteError::NoLiquidity(pool.venue_id.clone()));
        }

        // Balancer weighted-pool invariant: out = balanceOut * (1 - (balanceIn / (balanceIn + amountIn))^(weightIn/weightOut))
        let amount_in_f = amount_in.to::<u128>() as f64 / 1e18;
        let amount_in_after_fee = amount_in_f * (1.0 - fee_frac);
        let ratio = balance_in / (balance_in + amount_in_after_fee);
        let out_fraction = 1.0 - ratio.powf(weight_in / weight_out);
        let amount_out_f = balance_out * out_fraction;

        if !amount_out_f.is_finite() || amount_out_f <= 0.0 {
            return Err(QuoteError::NoLiquidity(pool.venue_id.clone()));
        }

        Ok(U256::from((amount_out_f * 1e18) as u128))
    }
}

fn balance_f64(v: U256) -> f64 {
    v.to::<u128>() as f64 / 1e18
}

fn weight_f64(v: U256) -> f64 {
    v.to::<u128>() as f64 / 1e18
}

/// Off-chain aggregator adapter. Returns a firm quote from an HTTP API;
/// the engine treats it as indicative only — final execution still goes
/// through on-chain simulation (SPEC_FULL.md §9 open question (c)).
pub struct AggregatorAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    chain_id: u64,
}

impl AggregatorAdapter {
    pub fn new(base_url: String, api_key: Option<String>, chain_id: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            chain_id,
        }
    }
}

#[async_trait]
impl VenueAdapter for AggregatorAdapter {
    async fn quote(&self, pool: &DiscoveredPool, token_in: Address, amount_in: U256) -> Result<U256, QuoteError> {
        let token_out = pool
            .other_token(token_in)
            .ok_or_else(|| QuoteError::NoLiquidity(pool.venue_id.clone()))?;

        let mut request = self
            .client
            .get(format!("{}/swap/v1/price", self.base_url))
            .query(&[
                ("chainId", self.chain_id.to_string()),
                ("sellToken", format!("{token_in:#x}")),
                ("buyToken", format!("{token_out:#x}")),
                ("sellAmount", amount_in.to_string()),
            ]);

        if let Some(key) = &self.api_key {
            request = request.header("0x-api-key", key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                QuoteError::Timeout
            } else {
                QuoteError::AdapterCall {
                    venue: pool.venue_id.clone(),
                    source: e.into(),
                }
            }
        })?;

        if response.status().as_u16() == 429 {
            return Err(QuoteError::RateLimited);
        }

        let body: serde_json::Value = response.json().await.map_err(|e| QuoteError::AdapterCall {
            venue: pool.venue_id.clone(),
            source: e.into(),
        })?;

        let buy_amount = body
            .get("buyAmount")
            .and_then(|v| v.as_str())
            .ok_or_else(|| QuoteError::NoLiquidity(pool.venue_id.clone()))?;

        U256::from_str_radix(buy_amount, 10).map_err(|_| QuoteError::NoLiquidity(pool.venue_id.clone()))
    }
}

/// Dispatch a single leg's quote through the adapter matching its venue kind.
pub async fn quote_leg(
    adapters: &AdapterSet<impl Provider + 'static>,
    pool: &DiscoveredPool,
    token_in: Address,
    amount_in: U256,
) -> Result<U256, QuoteError> {
    match pool.venue_kind {
        VenueKind::V2Amm | VenueKind::StableCl => adapters.reserve.quote(pool, token_in, amount_in).await,
        VenueKind::V3Cl => adapters.v3.quote(pool, token_in, amount_in).await,
        VenueKind::Weighted => adapters.weighted.quote(pool, token_in, amount_in).await,
        VenueKind::Aggregator => adapters.aggregator.quote(pool, token_in, amount_in).await,
    }
}

/// Bundles one adapter per venue kind so call sites don't have to match
/// on `VenueKind` themselves.
pub struct AdapterSet<P> {
    pub reserve: ReserveAdapter,
    pub v3: V3Adapter<P>,
    pub weighted: WeightedAdapter<P>,
    pub aggregator: AggregatorAdapter,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_product_matches_hand_computed_997_fee() {
        let reserve_in = U256::from(1_000_000u64);
        let reserve_out = U256::from(2_000_000u64);
        let amount_in = U256::from(1_000u64);
        let out = constant_product_out(amount_in, reserve_in, reserve_out, 30).unwrap();
        // amount_in_after_fee = 1000 * 9970 = 9_970_000
        // numerator = 9_970_000 * 2_000_000
        // denominator = 1_000_000*10_000 + 9_970_000
        let expected_num = U256::from(9_970_000u64) * U256::from(2_000_000u64);
        let expected_den = U256::from(1_000_000u64) * U256::from(10_000u64) + U256::from(9_970_000u64);
        assert_eq!(out, expected_num / expected_den);
    }

    #[test]
    fn constant_product_rejects_empty_reserves() {
        assert!(constant_product_out(U256::from(1u64), U256::ZERO, U256::from(1u64), 30).is_none());
    }
}
