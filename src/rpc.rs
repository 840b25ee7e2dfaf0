//! Chain RPC boundary
//!
//! Everything a listener needs from a node, behind a trait so listeners can
//! be driven by in-memory doubles in tests.

use alloy::consensus::Transaction as _;
use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::Filter;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use tracing::{debug, info, warn};

use crate::registry::ChainConfig;
use crate::rpc_fallback::{create_provider, RawBlockNumberClient};
use crate::types::{LogRecord, TransactionInfo};

#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Logs from `from_block` to the latest block, optionally restricted to
    /// one emitting contract.
    async fn filter_logs(&self, from_block: u64, address: Option<Address>)
        -> Result<Vec<LogRecord>>;

    /// Head block number through the primary provider.
    async fn block_number(&self) -> Result<u64>;

    /// Head block number through the raw JSON-RPC path.
    async fn fallback_block_number(&self) -> Result<u64>;

    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<TransactionInfo>>;
}

/// alloy-backed RPC for one EVM chain
pub struct EvmRpc {
    chain_id: u64,
    provider: RootProvider<Http<Client>>,
    fallback: RawBlockNumberClient,
}

impl EvmRpc {
    /// Build the provider and verify the endpoint answers `eth_chainId`.
    ///
    /// A failure here is fatal for the process; a chain id that differs from
    /// the configured one is only warned about.
    pub async fn connect(chain: &ChainConfig) -> Result<Self> {
        let provider = create_provider(&chain.rpc_url)?;
        let fallback = RawBlockNumberClient::new(chain.all_rpc_urls())?;

        let reported = provider
            .get_chain_id()
            .await
            .wrap_err_with(|| format!("Failed to connect to {} at {}", chain.name, chain.rpc_url))?;

        if reported != chain.id {
            warn!(
                chain = %chain.name,
                configured = chain.id,
                reported,
                "RPC endpoint reports a different chain ID"
            );
        } else {
            info!(chain = %chain.name, chain_id = chain.id, "Connected to chain");
        }

        Ok(Self {
            chain_id: chain.id,
            provider,
            fallback,
        })
    }
}

#[async_trait]
impl ChainRpc for EvmRpc {
    async fn filter_logs(
        &self,
        from_block: u64,
        address: Option<Address>,
    ) -> Result<Vec<LogRecord>> {
        let mut filter = Filter::new().from_block(from_block);
        if let Some(address) = address {
            filter = filter.address(address);
        }

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .wrap_err("Failed to get logs")?;

        let mut records = Vec::with_capacity(logs.len());
        for log in &logs {
            match LogRecord::try_from(log) {
                Ok(record) => records.push(record),
                // pending logs carry no hash yet
                Err(e) => debug!(chain_id = self.chain_id, error = %e, "Skipping log"),
            }
        }
        Ok(records)
    }

    async fn block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .wrap_err("Failed to get block number")
    }

    async fn fallback_block_number(&self) -> Result<u64> {
        self.fallback.block_number().await
    }

    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<TransactionInfo>> {
        let tx = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(|e| eyre!("Failed to get transaction {}: {}", hash, e))?;

        Ok(tx.map(|tx| TransactionInfo {
            hash,
            input: tx.input().clone(),
            value: tx.value(),
            is_pending: tx.block_number.is_none(),
        }))
    }
}
