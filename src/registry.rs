//! Chain Registry
//!
//! Static description of every configured network. Built once at startup and
//! shared read-only by every listener; lookups are linear scans over a handful
//! of chains.

use alloy::primitives::Address;
use eyre::{eyre, Result};
use std::collections::HashSet;
use std::sync::Arc;

/// Configuration for a single bridged chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    /// Human-readable name (e.g., "ethereum", "bsc")
    pub name: String,
    /// Chain identifier, unique across the registry
    pub id: u64,
    /// Primary RPC endpoint
    pub rpc_url: String,
    /// Additional endpoints tried by the raw block-number fallback
    pub rpc_fallback_urls: Vec<String>,
    /// Bridge contract address
    pub contract_address: Address,
    /// Gas price (wei) handed to the transaction writer
    pub gas_price: u128,
    /// Signer address used by the transaction writer
    pub from_address: Address,
    /// Initial nonce for the writer; the writer owns it afterwards
    pub nonce: u64,
    /// Initial block cursor
    pub start_block: u64,
}

impl ChainConfig {
    /// All RPC URLs: primary followed by fallbacks.
    pub fn all_rpc_urls(&self) -> Vec<String> {
        let mut urls = vec![self.rpc_url.clone()];
        urls.extend(self.rpc_fallback_urls.iter().cloned());
        urls
    }
}

/// Registry of all configured chains
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: Vec<Arc<ChainConfig>>,
}

impl ChainRegistry {
    /// Create a registry, rejecting empty or duplicate-id configurations
    pub fn new(chains: Vec<ChainConfig>) -> Result<Self> {
        if chains.is_empty() {
            return Err(eyre!("At least one chain must be configured"));
        }

        let mut seen_ids = HashSet::new();
        let mut seen_names = HashSet::new();
        for chain in &chains {
            if !seen_ids.insert(chain.id) {
                return Err(eyre!("Duplicate chain ID: {}", chain.id));
            }
            if !seen_names.insert(chain.name.as_str()) {
                return Err(eyre!("Duplicate chain name: {}", chain.name));
            }
            if chain.rpc_url.is_empty() {
                return Err(eyre!("Chain {} has an empty RPC URL", chain.name));
            }
        }

        Ok(Self {
            chains: chains.into_iter().map(Arc::new).collect(),
        })
    }

    /// Get chain config by chain ID
    pub fn find_by_id(&self, id: u64) -> Option<&Arc<ChainConfig>> {
        self.chains.iter().find(|c| c.id == id)
    }

    /// Get chain config by name
    pub fn find_by_name(&self, name: &str) -> Option<&Arc<ChainConfig>> {
        self.chains.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ChainConfig>> {
        self.chains.iter()
    }

}

#[cfg(test)]
pub(crate) fn test_chain(name: &str, id: u64, rpc_url: &str) -> ChainConfig {
    ChainConfig {
        name: name.to_string(),
        id,
        rpc_url: rpc_url.to_string(),
        rpc_fallback_urls: vec![],
        contract_address: Address::repeat_byte(id as u8),
        gas_price: 1_000_000_000,
        from_address: Address::repeat_byte(0xf0),
        nonce: 0,
        start_block: 0,
    }
}
