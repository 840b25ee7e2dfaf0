//! Outbound transaction boundary
//!
//! Signing and broadcasting happen behind [`BridgeWriter`]. The relay only
//! decides *what* to submit and *where*; implementations own keys and nonces
//! and must serialize submissions per chain.

use alloy::primitives::U256;
use async_trait::async_trait;
use eyre::{eyre, Result};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::info;

use crate::registry::{ChainConfig, ChainRegistry};
use crate::types::Withdrawal;

#[async_trait]
pub trait BridgeWriter: Send + Sync {
    /// Release funds on `chain` for a deposit observed elsewhere.
    async fn withdraw(&self, chain: &ChainConfig, withdrawal: &Withdrawal) -> Result<()>;

    /// Lock `value` on `chain` for release on the chain encoded in `dest_chain_hex`.
    async fn deposit(&self, chain: &ChainConfig, value: U256, dest_chain_hex: &str) -> Result<()>;

    /// Operator-initiated withdrawal on `chain`.
    async fn withdraw_to(
        &self,
        chain: &ChainConfig,
        value: U256,
        dest_chain_hex: &str,
    ) -> Result<()>;

    async fn fund_bridge(&self, chain: &ChainConfig, value: U256) -> Result<()>;

    async fn pay_bridge(&self, chain: &ChainConfig, value: U256) -> Result<()>;

    /// Per-chain shutdown hook, given the listener's last cursor.
    async fn cleanup(&self, chain: &ChainConfig, last_block: u64) -> Result<()>;
}

/// Writer that reports every intent without signing anything.
///
/// Nonces start from each chain's configured value and advance once per
/// submitted intent, under a per-chain lock.
pub struct DryRunWriter {
    nonces: HashMap<u64, Mutex<u64>>,
}

impl DryRunWriter {
    pub fn new(registry: &ChainRegistry) -> Self {
        let nonces = registry
            .iter()
            .map(|chain| (chain.id, Mutex::new(chain.nonce)))
            .collect();
        Self { nonces }
    }

    /// Next nonce that would be used on `chain_id`
    pub async fn nonce(&self, chain_id: u64) -> Option<u64> {
        match self.nonces.get(&chain_id) {
            Some(nonce) => Some(*nonce.lock().await),
            None => None,
        }
    }

    async fn submit(&self, chain: &ChainConfig, action: &str, detail: String) -> Result<u64> {
        let slot = self
            .nonces
            .get(&chain.id)
            .ok_or_else(|| eyre!("No writer state for chain {}", chain.id))?;
        let mut nonce = slot.lock().await;
        let used = *nonce;
        info!(
            chain = %chain.name,
            chain_id = chain.id,
            contract = %chain.contract_address,
            from = %chain.from_address,
            gas_price = chain.gas_price,
            nonce = used,
            action,
            %detail,
            "Dry run: transaction not broadcast"
        );
        *nonce += 1;
        Ok(used)
    }
}

#[async_trait]
impl BridgeWriter for DryRunWriter {
    async fn withdraw(&self, chain: &ChainConfig, withdrawal: &Withdrawal) -> Result<()> {
        let detail = format!(
            "recipient={} value={} dest_chain={} tx={} data={}",
            withdrawal.recipient,
            withdrawal.value,
            withdrawal.dest_chain,
            withdrawal.tx_hash,
            withdrawal.data
        );
        self.submit(chain, "withdraw", detail).await?;
        Ok(())
    }

    async fn deposit(&self, chain: &ChainConfig, value: U256, dest_chain_hex: &str) -> Result<()> {
        self.submit(chain, "deposit", format!("value={} to=0x{}", value, dest_chain_hex))
            .await?;
        Ok(())
    }

    async fn withdraw_to(
        &self,
        chain: &ChainConfig,
        value: U256,
        dest_chain_hex: &str,
    ) -> Result<()> {
        self.submit(chain, "withdraw_to", format!("value={} to=0x{}", value, dest_chain_hex))
            .await?;
        Ok(())
    }

    async fn fund_bridge(&self, chain: &ChainConfig, value: U256) -> Result<()> {
        self.submit(chain, "fund_bridge", format!("value={}", value)).await?;
        Ok(())
    }

    async fn pay_bridge(&self, chain: &ChainConfig, value: U256) -> Result<()> {
        self.submit(chain, "pay_bridge", format!("value={}", value)).await?;
        Ok(())
    }

    async fn cleanup(&self, chain: &ChainConfig, last_block: u64) -> Result<()> {
        let next_nonce = self.nonce(chain.id).await;
        info!(
            chain = %chain.name,
            chain_id = chain.id,
            last_block,
            ?next_nonce,
            "Chain cleanup complete"
        );
        Ok(())
    }
}
