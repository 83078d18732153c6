//! Private-relay submission (§4.10, §6): a raw signed tx is wrapped in a
//! single-transaction bundle and posted to the relay's `eth_sendBundle`
//! JSON-RPC method, targeting the next block. Falls back to the public
//! mempool when the relay is disabled or the call fails.

use alloy::primitives::Bytes;
use alloy::providers::Provider;
use anyhow::{bail, Context, Result};
use std::time::Duration;
use tracing::{debug, warn};

const RELAY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct PrivateRelay {
    relay_url: String,
    http: reqwest::Client,
}

impl PrivateRelay {
    pub fn new(relay_url: String) -> Self {
        Self { relay_url, http: reqwest::Client::builder().timeout(RELAY_TIMEOUT).build().unwrap_or_default() }
    }

    /// Posts the signed tx as a one-transaction bundle targeting `target_block`.
    pub async fn submit_bundle(&self, signed_tx: &Bytes, target_block: u64) -> Result<()> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_sendBundle",
            "params": [{
                "txs": [signed_tx.to_string()],
                "blockNumber": format!("0x{:x}", target_block),
            }],
        });

        let response = self
            .http
            .post(&self.relay_url)
            .json(&body)
            .send()
            .await
            .context("private relay request failed")?;

        if !response.status().is_success() {
            bail!("private relay returned HTTP {}", response.status());
        }

        let parsed: serde_json::Value = response.json().await.context("private relay response was not JSON")?;
        if let Some(err) = parsed.get("error") {
            bail!("private relay rejected bundle: {err}");
        }

        debug!(target_block, "bundle accepted by private relay");
        Ok(())
    }
}

/// Public-mempool fallback: plain `eth_sendRawTransaction`.
pub async fn submit_public<P: Provider>(provider: &P, signed_tx: Bytes) -> Result<alloy::primitives::B256> {
    let pending = provider
        .send_raw_transaction(&signed_tx)
        .await
        .context("public eth_sendRawTransaction failed")?;
    let hash = *pending.tx_hash();
    warn!(tx_hash = %hash, "submitted via public mempool fallback");
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_url_is_retained_verbatim() {
        let relay = PrivateRelay::new("https://relay.example/v1".to_string());
        assert_eq!(relay.relay_url, "https://relay.example/v1");
    }
}
