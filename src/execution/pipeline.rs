//! Execution Pipeline (C10): the `NEW → PREFLIGHT → ENCODE → SIMULATE →
//! BUILD_TX → SUBMIT_PRIVATE → WAIT` state machine described in §4.10.

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::contracts::IArbExecutor;
use crate::error::ExecutionError;
use crate::gas::GasParams;
use crate::risk::RiskController;
use crate::types::ArbOpportunity;

use super::nonce::NonceTracker;
use super::relay::{submit_public, PrivateRelay};

const MIN_SIGNER_BALANCE_WEI: u128 = 10_000_000_000_000_000; // 0.01 ETH
const MAX_OPPORTUNITY_AGE_MILLIS: u64 = 5_000;
const PRIVATE_RELAY_WAIT: Duration = Duration::from_secs(2);
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const STALE_TIMEOUT: Duration = Duration::from_secs(30);
const GAS_LIMIT_BUFFER_NUM: u64 = 12;
const GAS_LIMIT_BUFFER_DEN: u64 = 10;

#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Confirmed { tx_hash: B256, gas_used: u64, gas_cost_usd: f64, profit_usd: f64 },
    Reverted { tx_hash: B256, gas_cost_usd: f64 },
    Stale { tx_hash: B256 },
    Rejected { reason: String },
}

pub struct ExecutionPipeline<P: Provider + Clone> {
    provider: P,
    signer: PrivateKeySigner,
    contract_address: Address,
    chain_id: u64,
    max_gas_price_gwei: f64,
    enable_private_relay: bool,
    relay: Option<PrivateRelay>,
    nonce: NonceTracker,
    in_flight: AtomicBool,
    eth_price_usd: f64,
}

impl<P: Provider + Clone> ExecutionPipeline<P> {
    pub async fn new(
        provider: P,
        signer: PrivateKeySigner,
        contract_address: Address,
        chain_id: u64,
        max_gas_price_gwei: f64,
        enable_private_relay: bool,
        relay_url: Option<String>,
        eth_price_usd: f64,
    ) -> anyhow::Result<Self> {
        let nonce = NonceTracker::new(&provider, signer.address()).await?;
        let relay = relay_url.map(PrivateRelay::new);
        Ok(Self {
            provider,
            signer,
            contract_address,
            chain_id,
            max_gas_price_gwei,
            enable_private_relay,
            relay,
            nonce,
            in_flight: AtomicBool::new(false),
            eth_price_usd,
        })
    }

    /// Drives one opportunity through the full state machine. Every
    /// failure path returns a terminal `ExecutionOutcome` rather than an
    /// `Err` — callers feed the result straight into the risk controller.
    pub async fn execute(
        &self,
        opportunity: &ArbOpportunity,
        gas: GasParams,
        now_millis: u64,
        risk: &mut RiskController,
    ) -> ExecutionOutcome {
        if let Err(reason) = self.preflight(opportunity, &gas, now_millis).await {
            debug!(reason = %reason, "preflight rejected opportunity");
            return ExecutionOutcome::Rejected { reason: reason.to_string() };
        }

        let (legs, policy) = match encode_legs(opportunity) {
            Ok(v) => v,
            Err(reason) => return ExecutionOutcome::Rejected { reason },
        };

        if let Err(reason) =
            self.simulate(opportunity.borrow_asset, opportunity.borrow_amount, legs.clone(), policy.clone()).await
        {
            return ExecutionOutcome::Rejected { reason: reason.to_string() };
        }

        let calldata = IArbExecutor::executeArbitrageCall {
            borrowAsset: opportunity.borrow_asset,
            borrowAmount: opportunity.borrow_amount,
            legs,
            policy,
        }
        .abi_encode();

        self.in_flight.store(true, Ordering::SeqCst);
        let outcome = self.build_and_submit(calldata, gas, opportunity.gas_estimate, opportunity.profit_usd).await;
        self.in_flight.store(false, Ordering::SeqCst);

        match &outcome {
            ExecutionOutcome::Confirmed { gas_cost_usd, profit_usd, .. } => {
                risk.record(profit_usd / self.eth_price_usd.max(1e-9), *gas_cost_usd / self.eth_price_usd.max(1e-9), now_millis);
            }
            ExecutionOutcome::Reverted { gas_cost_usd, .. } => {
                risk.record(-gas_cost_usd / self.eth_price_usd.max(1e-9), *gas_cost_usd / self.eth_price_usd.max(1e-9), now_millis);
            }
            ExecutionOutcome::Stale { .. } | ExecutionOutcome::Rejected { .. } => {}
        }

        outcome
    }

    async fn preflight(&self, opportunity: &ArbOpportunity, gas: &GasParams, now_millis: u64) -> Result<(), ExecutionError> {
        let contract = IArbExecutor::new(self.contract_address, self.provider.clone());
        let paused = contract
            .paused()
            .call()
            .await
            .map_err(|e| ExecutionError::PreflightFailed(format!("paused() call failed: {e}")))?;
        if paused {
            return Err(ExecutionError::PreflightFailed("contract is paused".to_string()));
        }

        let effective_gas_price_gwei = gas.base_fee_gwei + gas.priority_fee_gwei;
        if effective_gas_price_gwei > self.max_gas_price_gwei {
            return Err(ExecutionError::PreflightFailed(format!(
                "gas price {effective_gas_price_gwei:.3} gwei exceeds max {:.3} gwei",
                self.max_gas_price_gwei
            )));
        }

        let age = opportunity.age_millis(now_millis);
        if age > MAX_OPPORTUNITY_AGE_MILLIS {
            return Err(ExecutionError::PreflightFailed(format!("opportunity is {age}ms stale")));
        }

        if self.in_flight.load(Ordering::SeqCst) {
            return Err(ExecutionError::PreflightFailed("another transaction is already in flight".to_string()));
        }

        let balance = self
            .provider
            .get_balance(self.signer.address())
            .await
            .map_err(|e| ExecutionError::PreflightFailed(format!("balance check failed: {e}")))?;
        if balance < U256::from(MIN_SIGNER_BALANCE_WEI) {
            return Err(ExecutionError::PreflightFailed("signer balance below 0.01 ETH floor".to_string()));
        }

        Ok(())
    }

    async fn simulate(
        &self,
        borrow_asset: Address,
        borrow_amount: U256,
        legs: Vec<IArbExecutor::Leg>,
        policy: IArbExecutor::Policy,
    ) -> Result<(), ExecutionError> {
        let contract = IArbExecutor::new(self.contract_address, self.provider.clone());
        contract
            .executeArbitrage(borrow_asset, borrow_amount, legs, policy)
            .call()
            .await
            .map(|_| ())
            .map_err(|e| ExecutionError::SimulationReverted(e.to_string()))
    }

    async fn build_and_submit(
        &self,
        calldata: Vec<u8>,
        gas: GasParams,
        gas_estimate: u64,
        expected_profit_usd: f64,
    ) -> ExecutionOutcome {
        let nonce = self.nonce.peek();
        let gas_limit = gas_estimate.saturating_mul(GAS_LIMIT_BUFFER_NUM) / GAS_LIMIT_BUFFER_DEN;
        let max_fee_wei = gwei_to_wei(gas.max_fee_gwei);
        let priority_fee_wei = gwei_to_wei(gas.priority_fee_gwei);

        let tx_request = TransactionRequest::default()
            .with_to(self.contract_address)
            .with_input(calldata)
            .with_nonce(nonce)
            .with_chain_id(self.chain_id)
            .with_max_fee_per_gas(max_fee_wei)
            .with_max_priority_fee_per_gas(priority_fee_wei)
            .with_gas_limit(gas_limit);

        let wallet = EthereumWallet::from(self.signer.clone());
        let envelope = match tx_request.build(&wallet).await {
            Ok(e) => e,
            Err(e) => return ExecutionOutcome::Rejected { reason: format!("tx signing failed: {e}") },
        };
        let tx_hash = *envelope.tx_hash();
        let signed_bytes: Bytes = alloy::eips::eip2718::Encodable2718::encoded_2718(&envelope).into();

        self.nonce.advance();

        let mut submitted_privately = false;
        if self.enable_private_relay {
            if let Some(relay) = &self.relay {
                let target_block = match self.provider.get_block_number().await {
                    Ok(n) => n + 1,
                    Err(_) => 0,
                };
                match relay.submit_bundle(&signed_bytes, target_block).await {
                    Ok(()) => {
                        submitted_privately = true;
                        tokio::time::sleep(PRIVATE_RELAY_WAIT).await;
                        if self.provider.get_transaction_receipt(tx_hash).await.ok().flatten().is_some() {
                            return self.wait_for_outcome(tx_hash, expected_profit_usd).await;
                        }
                        warn!(%tx_hash, "private bundle not included within one block, falling back to public");
                    }
                    Err(e) => warn!(error = %e, "private relay submission failed, falling back to public"),
                }
            }
        }

        if !submitted_privately {
            if let Err(e) = submit_public(&self.provider, signed_bytes).await {
                if e.to_string().to_lowercase().contains("nonce") {
                    let _ = self.nonce.reset(&self.provider).await;
                }
                return ExecutionOutcome::Rejected { reason: format!("public submission failed: {e}") };
            }
        }

        self.wait_for_outcome(tx_hash, expected_profit_usd).await
    }

    async fn wait_for_outcome(&self, tx_hash: B256, expected_profit_usd: f64) -> ExecutionOutcome {
        let deadline = tokio::time::Instant::now() + STALE_TIMEOUT;
        loop {
            if tokio::time::Instant::now() >= deadline {
                return ExecutionOutcome::Stale { tx_hash };
            }
            match self.provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    let gas_used = receipt.gas_used;
                    let effective_gas_price_wei = receipt.effective_gas_price;
                    let gas_cost_eth = (gas_used as f64) * (effective_gas_price_wei as f64) / 1e18;
                    let gas_cost_usd = gas_cost_eth * self.eth_price_usd;

                    if receipt.status() {
                        // Realized net profit: the opportunity's expected gross
                        // profit less the gas actually paid, not the estimate
                        // it was screened with. No receipt-log decode of the
                        // swap amounts exists yet, so this is the best realized
                        // figure available rather than a re-quote.
                        let profit_usd = expected_profit_usd - gas_cost_usd;
                        info!(%tx_hash, gas_used, profit_usd, "arbitrage transaction confirmed");
                        return ExecutionOutcome::Confirmed {
                            tx_hash,
                            gas_used: gas_used as u64,
                            gas_cost_usd,
                            profit_usd,
                        };
                    }
                    warn!(%tx_hash, "arbitrage transaction reverted on-chain");
                    return ExecutionOutcome::Reverted { tx_hash, gas_cost_usd };
                }
                Ok(None) => {
                    tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
                }
                Err(e) => {
                    debug!(error = %e, "receipt poll failed, retrying");
                    tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
                }
            }
        }
    }
}

fn gwei_to_wei(gwei: f64) -> u128 {
    (gwei.max(0.0) * 1e9) as u128
}

/// Builds the on-chain `Leg[]`/`Policy` pair. Enforces the invariants
/// §6 promises the contract: at least one leg, leg 0's `tokenIn` equals
/// the borrow asset, and the last leg's `tokenOut` equals it back.
fn encode_legs(opportunity: &ArbOpportunity) -> Result<(Vec<IArbExecutor::Leg>, IArbExecutor::Policy), String> {
    if opportunity.legs.is_empty() {
        return Err("opportunity has no legs".to_string());
    }
    let first = &opportunity.legs[0];
    let last = opportunity.legs.last().expect("checked non-empty above");
    if first.token_in != opportunity.borrow_asset {
        return Err("leg 0 tokenIn does not match borrow asset".to_string());
    }
    if last.token_out != opportunity.borrow_asset {
        return Err("final leg tokenOut does not match borrow asset".to_string());
    }

    let legs = opportunity
        .legs
        .iter()
        .map(|leg| IArbExecutor::Leg {
            venueKind: venue_kind_tag(leg.venue_kind),
            target: leg.pool_address,
            tokenIn: leg.token_in,
            tokenOut: leg.token_out,
            amountIn: leg.amount_in,
            amountOutMin: leg.amount_out_min,
            useBalanceIn: leg.amount_in_is_balance_marker,
            extraData: leg.venue_extra_data.clone().into(),
        })
        .collect();

    let policy = IArbExecutor::Policy { minProfitAmount: opportunity.expected_profit, useBalanceDiff: true };

    Ok((legs, policy))
}

fn venue_kind_tag(kind: crate::types::VenueKind) -> u8 {
    use crate::types::VenueKind;
    match kind {
        VenueKind::V2Amm => 0,
        VenueKind::V3Cl => 1,
        VenueKind::StableCl => 2,
        VenueKind::Weighted => 3,
        VenueKind::Aggregator => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StrategyKind, SwapLeg, VenueKind};

    fn leg(token_in: Address, token_out: Address) -> SwapLeg {
        SwapLeg {
            venue_id: "uni-v3-3000".to_string(),
            venue_kind: VenueKind::V3Cl,
            pool_address: Address::with_last_byte(9),
            token_in,
            token_out,
            amount_in: U256::from(1u64),
            amount_in_is_balance_marker: false,
            expected_amount_out: U256::from(1u64),
            amount_out_min: U256::from(1u64),
            fee_or_tick_spacing: 3000,
            venue_extra_data: Vec::new(),
        }
    }

    fn opportunity(legs: Vec<SwapLeg>) -> ArbOpportunity {
        ArbOpportunity {
            strategy_kind: StrategyKind::DirectArb,
            borrow_asset: Address::ZERO,
            borrow_amount: U256::from(1000u64),
            legs,
            expected_profit: U256::from(1u64),
            profit_bps: 1.0,
            profit_usd: 1.0,
            gas_estimate: 300_000,
            gas_cost_usd: 0.1,
            net_profit_usd: 0.9,
            created_millis: 0,
        }
    }

    #[test]
    fn rejects_empty_leg_list() {
        let opp = opportunity(vec![]);
        assert!(encode_legs(&opp).is_err());
    }

    #[test]
    fn rejects_leg0_tokenin_mismatch() {
        let opp = opportunity(vec![leg(Address::with_last_byte(1), Address::ZERO)]);
        assert!(encode_legs(&opp).is_err());
    }

    #[test]
    fn rejects_final_leg_tokenout_mismatch() {
        let opp = opportunity(vec![leg(Address::ZERO, Address::with_last_byte(2))]);
        assert!(encode_legs(&opp).is_err());
    }

    #[test]
    fn accepts_a_closed_loop() {
        let opp = opportunity(vec![
            leg(Address::ZERO, Address::with_last_byte(1)),
            leg(Address::with_last_byte(1), Address::ZERO),
        ]);
        let (legs, policy) = encode_legs(&opp).unwrap();
        assert_eq!(legs.len(), 2);
        assert!(policy.useBalanceDiff);
    }
}
