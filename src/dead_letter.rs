//! Dead-letter queue for deposits that could not be turned into a delivered
//! withdrawal
//!
//! In-memory and bounded; the oldest entry is dropped when full. Entries are
//! exposed on `/dead-letters` for operators to act on by hand.

use alloy::primitives::B256;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::warn;

use crate::types::Withdrawal;

pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// Destination chain id is not in the registry
    UnknownDestination,
    /// Writer rejected the withdrawal or retries ran out
    DispatchFailed,
    /// Deposit transaction was still pending when the wait timed out
    Unresolved,
    /// Deposit transaction input could not be decoded
    Malformed,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub source_chain: u64,
    pub tx_hash: B256,
    /// `None` when the deposit never decoded into a withdrawal
    pub withdrawal: Option<Withdrawal>,
    pub reason: DeadLetterReason,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct DeadLetterQueue {
    entries: Mutex<VecDeque<DeadLetter>>,
    capacity: usize,
}

impl DeadLetterQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Append an entry; returns the queue length afterwards
    pub async fn push(&self, entry: DeadLetter) -> usize {
        let mut entries = self.entries.lock().await;
        if entries.len() >= self.capacity {
            if let Some(dropped) = entries.pop_front() {
                warn!(
                    tx_hash = %dropped.tx_hash,
                    source_chain = dropped.source_chain,
                    "Dead-letter queue full, dropping oldest entry"
                );
            }
        }
        entries.push_back(entry);
        entries.len()
    }

    /// Copy of all entries, oldest first
    pub async fn snapshot(&self) -> Vec<DeadLetter> {
        self.entries.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl Default for DeadLetterQueue {
    fn default() -> Self {
        Self::new(DEFAULT_DEAD_LETTER_CAPACITY)
    }
}
