//! Seen-transaction set shared by every chain's dispatcher.
//!
//! Listeners rescan overlapping block ranges on purpose, so every transaction
//! hash that has been dispatched is recorded here and skipped afterwards.
//!
//! Entries are indexed by the chain and block they were found in. Nothing is
//! evicted by size: a listener prunes its own chain's entries once they fall
//! below the block its next filter starts from, since no later scan can return
//! them.
//!
//! ## Recommended RAM
//!
//! - Each entry is ~80 bytes (hash in the lookup set plus the block index), so
//!   100k live entries ≈ 8 MB.
//! - Live entries cover roughly one poll interval of blocks per chain.

use alloy::primitives::B256;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;

/// Hashes grouped by the chain and block that produced them.
#[derive(Debug, Default)]
struct BlockIndexedSet {
    hashes: HashSet<B256>,
    by_chain: HashMap<u64, BTreeMap<u64, Vec<B256>>>,
}

impl BlockIndexedSet {
    fn contains(&self, hash: &B256) -> bool {
        self.hashes.contains(hash)
    }

    /// Insert a hash; returns false if it was already present
    fn insert(&mut self, chain_id: u64, block: u64, hash: B256) -> bool {
        if !self.hashes.insert(hash) {
            return false;
        }
        self.by_chain
            .entry(chain_id)
            .or_default()
            .entry(block)
            .or_default()
            .push(hash);
        true
    }

    /// Drop every entry of `chain_id` found below `block`; returns how many
    fn prune_below(&mut self, chain_id: u64, block: u64) -> usize {
        let Some(blocks) = self.by_chain.get_mut(&chain_id) else {
            return 0;
        };
        let kept = blocks.split_off(&block);
        let pruned = std::mem::replace(blocks, kept);

        let mut removed = 0;
        for hash in pruned.into_values().flatten() {
            if self.hashes.remove(&hash) {
                removed += 1;
            }
        }
        removed
    }

    fn len(&self) -> usize {
        self.hashes.len()
    }
}

/// Mutex-guarded seen set; cheap to share behind the relay context
#[derive(Debug, Default)]
pub struct SeenTransactions {
    inner: Mutex<BlockIndexedSet>,
}

impl SeenTransactions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, tx_hash: &B256) -> bool {
        self.inner.lock().await.contains(tx_hash)
    }

    /// Mark a transaction as processed; returns false if it already was
    pub async fn mark(&self, chain_id: u64, block: u64, tx_hash: B256) -> bool {
        self.inner.lock().await.insert(chain_id, block, tx_hash)
    }

    /// Forget `chain_id`'s hashes below the block its next scan starts from
    pub async fn prune_below(&self, chain_id: u64, block: u64) -> usize {
        self.inner.lock().await.prune_below(chain_id, block)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
