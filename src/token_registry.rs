//! Token Registry (C1).
//!
//! Address -> {symbol, decimals, usd price}. Seeded at startup with a
//! small curated set of known tokens; unknown addresses are resolved
//! lazily by reading `symbol()`/`decimals()` on-chain. Prices for a
//! short fixed set of asset classes are derived from the ETH/BTC inputs
//! an operator (or the gas oracle's price feed) pushes in; every other
//! token has `price_usd = 0.0` and contributes nothing to TVL math.

use crate::contracts::IERC20;
use crate::error::TokenRegistryError;
use crate::types::TokenInfo;
use alloy::primitives::Address;
use alloy::providers::Provider;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Coarse asset-class tag used to derive a token's USD price from the two
/// inputs the registry is fed (`eth_usd`, `btc_usd`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssetClass {
    EthLike,
    BtcLike,
    UsdStable,
    /// EUR-pegged stablecoins price at a fixed multiple of USD.
    EurStable,
    Other,
}

#[derive(Clone)]
struct SeedEntry {
    symbol: &'static str,
    decimals: u8,
    class: AssetClass,
}

const EUR_USD_RATE: f64 = 1.08;

pub struct TokenRegistry<P> {
    provider: Arc<P>,
    tokens: Arc<DashMap<Address, TokenInfo>>,
    classes: Arc<DashMap<Address, AssetClass>>,
    eth_usd: std::sync::atomic::AtomicU64, // f64 bits
    btc_usd: std::sync::atomic::AtomicU64,
}

impl<P: Provider + 'static> TokenRegistry<P> {
    pub fn new(provider: Arc<P>, seeds: &[(Address, &'static str, u8, &'static str)]) -> Self {
        let tokens = Arc::new(DashMap::new());
        let classes = Arc::new(DashMap::new());

        for (addr, symbol, decimals, class_tag) in seeds {
            let class = match *class_tag {
                "eth" => AssetClass::EthLike,
                "btc" => AssetClass::BtcLike,
                "usd" => AssetClass::UsdStable,
                "eur" => AssetClass::EurStable,
                _ => AssetClass::Other,
            };
            classes.insert(*addr, class);
            tokens.insert(
                *addr,
                TokenInfo {
                    address: *addr,
                    symbol: symbol.to_string(),
                    decimals: *decimals,
                    price_usd: 0.0,
                },
            );
        }

        let registry = Self {
            provider,
            tokens,
            classes,
            eth_usd: std::sync::atomic::AtomicU64::new(0),
            btc_usd: std::sync::atomic::AtomicU64::new(0),
        };
        registry.update_prices(2500.0, 60000.0);
        registry
    }

    /// Re-derive USD prices for every seeded asset-class token from fresh
    /// ETH/BTC inputs. Tokens with `AssetClass::Other` are left at 0.0.
    pub fn update_prices(&self, eth_usd: f64, btc_usd: f64) {
        self.eth_usd.store(eth_usd.to_bits(), std::sync::atomic::Ordering::Relaxed);
        self.btc_usd.store(btc_usd.to_bits(), std::sync::atomic::Ordering::Relaxed);

        for mut entry in self.tokens.iter_mut() {
            let addr = *entry.key();
            let price = match self.classes.get(&addr).map(|c| *c) {
                Some(AssetClass::EthLike) => eth_usd,
                Some(AssetClass::BtcLike) => btc_usd,
                Some(AssetClass::UsdStable) => 1.0,
                Some(AssetClass::EurStable) => EUR_USD_RATE,
                _ => entry.price_usd,
            };
            entry.price_usd = price;
        }
    }

    /// Resolve a token, reading on-chain metadata on first sight.
    pub async fn resolve(&self, address: Address) -> Option<TokenInfo> {
        if let Some(info) = self.tokens.get(&address) {
            return Some(info.clone());
        }

        let erc20 = IERC20::new(address, self.provider.clone());
        let symbol_result = erc20.symbol().call().await;
        let decimals_result = erc20.decimals().call().await;

        if symbol_result.is_err() && decimals_result.is_err() {
            debug!(%address, "neither symbol() nor decimals() resolved, not an ERC20, pool will be dropped");
            return None;
        }

        let symbol = match symbol_result {
            Ok(s) => s,
            Err(e) => {
                warn!(%address, error = %e, "symbol() failed, defaulting to UNKNOWN");
                "UNKNOWN".to_string()
            }
        };
        let decimals = match decimals_result {
            Ok(d) => d,
            Err(e) => {
                warn!(%address, error = %e, "decimals() failed, defaulting to 18");
                18
            }
        };

        debug!(%address, %symbol, decimals, "resolved new token");
        let info = TokenInfo {
            address,
            symbol,
            decimals,
            price_usd: 0.0,
        };
        self.tokens.insert(address, info.clone());
        Some(info)
    }

    /// Best-effort synchronous lookup, used on hot paths that must not
    /// await an RPC call (e.g. inside the quote engine's fan-out).
    pub fn get_known(&self, address: Address) -> Option<TokenInfo> {
        self.tokens.get(&address).map(|e| e.clone())
    }

    pub fn is_known(&self, address: Address) -> bool {
        self.tokens.get(&address).map(|e| e.price_usd > 0.0).unwrap_or(false)
    }

    /// USD value of `amount` raw units of `token`. Zero for unpriced tokens.
    pub fn value_usd(&self, token: Address, amount: alloy::primitives::U256, decimals: u8) -> f64 {
        let price = self.tokens.get(&token).map(|e| e.price_usd).unwrap_or(0.0);
        if price == 0.0 {
            return 0.0;
        }
        let amount_f = amount.to::<u128>() as f64 / 10f64.powi(decimals as i32);
        amount_f * price
    }

    pub fn try_value_usd_or_err(&self, token: Address) -> Result<f64, TokenRegistryError> {
        self.tokens
            .get(&token)
            .map(|e| e.price_usd)
            .ok_or(TokenRegistryError::Unresolvable(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::providers::ProviderBuilder;

    fn test_registry() -> TokenRegistry<impl Provider> {
        let provider = ProviderBuilder::new().connect_http("http://127.0.0.1:8545".parse().unwrap());
        let weth = Address::with_last_byte(1);
        let usdc = Address::with_last_byte(2);
        TokenRegistry::new(
            Arc::new(provider),
            &[(weth, "WETH", 18, "eth"), (usdc, "USDC", 6, "usd")],
        )
    }

    #[test]
    fn seeded_prices_derive_from_eth_and_btc_inputs() {
        let registry = test_registry();
        let weth = Address::with_last_byte(1);
        let usdc = Address::with_last_byte(2);

        registry.update_prices(2500.0, 60000.0);
        assert_eq!(registry.get_known(weth).unwrap().price_usd, 2500.0);
        assert_eq!(registry.get_known(usdc).unwrap().price_usd, 1.0);
    }

    #[test]
    fn unpriced_token_contributes_zero_to_value_usd() {
        let registry = test_registry();
        let random = Address::with_last_byte(99);
        assert_eq!(
            registry.value_usd(random, alloy::primitives::U256::from(1_000_000u64), 18),
            0.0
        );
    }
}
