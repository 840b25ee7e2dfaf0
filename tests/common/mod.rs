//! In-memory doubles for the RPC and writer boundaries

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use eyre::{eyre, Result};

use bridge_relay::events::EventTopics;
use bridge_relay::retry::{PendingWaitConfig, RetryConfig};
use bridge_relay::rpc::ChainRpc;
use bridge_relay::writer::BridgeWriter;
use bridge_relay::{
    ChainConfig, ChainRegistry, EventCatalog, LogRecord, RelayContext, RelayOptions,
    TransactionInfo, Withdrawal,
};

pub const DEPOSIT_TOPIC: B256 = B256::repeat_byte(0x01);
pub const CREATION_TOPIC: B256 = B256::repeat_byte(0x02);
pub const WITHDRAW_TOPIC: B256 = B256::repeat_byte(0x03);
pub const PAID_TOPIC: B256 = B256::repeat_byte(0x06);
pub const UNKNOWN_TOPIC: B256 = B256::repeat_byte(0xee);

pub fn topics() -> EventTopics {
    EventTopics {
        deposit: DEPOSIT_TOPIC,
        creation: CREATION_TOPIC,
        withdraw: WITHDRAW_TOPIC,
        bridge_set: B256::repeat_byte(0x04),
        bridge_funded: B256::repeat_byte(0x05),
        paid: PAID_TOPIC,
    }
}

pub fn chain(name: &str, id: u64) -> ChainConfig {
    ChainConfig {
        name: name.to_string(),
        id,
        rpc_url: format!("http://{}.invalid", name),
        rpc_fallback_urls: vec![],
        contract_address: bridge_address(id),
        gas_price: 1_000_000_000,
        from_address: Address::repeat_byte(0xf0),
        nonce: 0,
        start_block: 0,
    }
}

pub fn bridge_address(chain_id: u64) -> Address {
    Address::repeat_byte(0xb0 + chain_id as u8)
}

/// Options with millisecond waits so tests finish quickly
pub fn fast_options() -> RelayOptions {
    RelayOptions {
        poll_interval: Duration::from_millis(10),
        pending_wait: PendingWaitConfig {
            backoff: RetryConfig {
                max_retries: u32::MAX,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
                backoff_multiplier: 2.0,
            },
            timeout: Duration::from_millis(100),
        },
        dispatch_retry: RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            backoff_multiplier: 2.0,
        },
        shutdown_timeout: Duration::from_secs(5),
        ..RelayOptions::default()
    }
}

pub fn context(
    chains: Vec<ChainConfig>,
    writer: Arc<dyn BridgeWriter>,
    options: RelayOptions,
) -> Arc<RelayContext> {
    let registry = Arc::new(ChainRegistry::new(chains).expect("valid test registry"));
    let events = EventCatalog::new(&topics()).expect("distinct test topics");
    Arc::new(RelayContext::new(registry, events, writer, options))
}

fn word(value: U256) -> [u8; 32] {
    value.to_be_bytes()
}

/// Deposit call input: selector, padded recipient, destination chain word
pub fn deposit_input(recipient: Address, dest_chain: u64) -> Bytes {
    let mut input = vec![0xd0, 0xe3, 0x0d, 0xb0];
    input.extend_from_slice(&[0u8; 12]);
    input.extend_from_slice(recipient.as_slice());
    input.extend_from_slice(&word(U256::from(dest_chain)));
    Bytes::from(input)
}

/// Withdraw call input: selector, padded recipient, value word, source chain word
pub fn withdraw_input(recipient: Address, value: u64, source_chain: u64) -> Bytes {
    let mut input = vec![0x2e, 0x1a, 0x7d, 0x4d];
    input.extend_from_slice(&[0u8; 12]);
    input.extend_from_slice(recipient.as_slice());
    input.extend_from_slice(&word(U256::from(value)));
    input.extend_from_slice(&word(U256::from(source_chain)));
    Bytes::from(input)
}

pub fn log(tx_hash: B256, block: u64, chain_id: u64, topics: Vec<B256>) -> LogRecord {
    LogRecord {
        tx_hash,
        address: bridge_address(chain_id),
        block_number: block,
        topics,
        data: Bytes::new(),
    }
}

pub fn confirmed_tx(hash: B256, input: Bytes, value: u64) -> TransactionInfo {
    TransactionInfo {
        hash,
        input,
        value: U256::from(value),
        is_pending: false,
    }
}

/// Scriptable chain node
#[derive(Default)]
pub struct MockRpc {
    pub logs: Mutex<Vec<LogRecord>>,
    pub txs: Mutex<HashMap<B256, TransactionInfo>>,
    /// Polls left before a transaction is reported as included
    pub pending_polls: Mutex<HashMap<B256, usize>>,
    /// `None` makes the call fail
    pub head: Mutex<Option<u64>>,
    pub fallback_head: Mutex<Option<u64>>,
    pub fail_filter: Mutex<bool>,
    /// Transaction lookups left to fail before answering
    pub tx_failures: Mutex<usize>,
    /// Highest block the log filter can see; `None` means no limit
    pub filter_latest: Mutex<Option<u64>>,
    pub filter_from: Mutex<Vec<u64>>,
    pub filter_addresses: Mutex<Vec<Option<Address>>>,
    pub filter_calls: AtomicUsize,
    pub head_calls: AtomicUsize,
    pub fallback_calls: AtomicUsize,
    pub tx_calls: AtomicUsize,
}

impl MockRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_head(self, head: u64) -> Self {
        *self.head.lock().unwrap() = Some(head);
        self
    }

    pub fn add_log(&self, log: LogRecord) {
        self.logs.lock().unwrap().push(log);
    }

    pub fn add_tx(&self, tx: TransactionInfo) {
        self.txs.lock().unwrap().insert(tx.hash, tx);
    }

    pub fn set_head(&self, head: Option<u64>) {
        *self.head.lock().unwrap() = head;
    }

    pub fn set_fallback_head(&self, head: Option<u64>) {
        *self.fallback_head.lock().unwrap() = head;
    }

    pub fn pend(&self, hash: B256, polls: usize) {
        self.pending_polls.lock().unwrap().insert(hash, polls);
    }
}

#[async_trait]
impl ChainRpc for MockRpc {
    async fn filter_logs(
        &self,
        from_block: u64,
        address: Option<Address>,
    ) -> Result<Vec<LogRecord>> {
        self.filter_calls.fetch_add(1, Ordering::SeqCst);
        self.filter_addresses.lock().unwrap().push(address);
        self.filter_from.lock().unwrap().push(from_block);
        if *self.fail_filter.lock().unwrap() {
            return Err(eyre!("connection refused"));
        }
        let latest = *self.filter_latest.lock().unwrap();
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.block_number >= from_block)
            .filter(|l| latest.map_or(true, |latest| l.block_number <= latest))
            .filter(|l| address.map_or(true, |a| a == l.address))
            .cloned()
            .collect())
    }

    async fn block_number(&self) -> Result<u64> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        self.head
            .lock()
            .unwrap()
            .ok_or_else(|| eyre!("primary head unavailable"))
    }

    async fn fallback_block_number(&self) -> Result<u64> {
        self.fallback_calls.fetch_add(1, Ordering::SeqCst);
        self.fallback_head
            .lock()
            .unwrap()
            .ok_or_else(|| eyre!("fallback head unavailable"))
    }

    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<TransactionInfo>> {
        self.tx_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.tx_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(eyre!("upstream connect error"));
            }
        }
        let tx = self.txs.lock().unwrap().get(&hash).cloned();
        let Some(mut tx) = tx else {
            return Ok(None);
        };

        let mut pending = self.pending_polls.lock().unwrap();
        match pending.get_mut(&hash) {
            Some(left) if *left > 0 => {
                *left -= 1;
                tx.is_pending = true;
            }
            Some(_) => {
                pending.remove(&hash);
            }
            None => {}
        }
        Ok(Some(tx))
    }
}

/// Writer that records every call
#[derive(Default)]
pub struct RecordingWriter {
    pub withdrawals: Mutex<Vec<(u64, Withdrawal)>>,
    pub cleanups: Mutex<Vec<(u64, u64)>>,
    /// Errors returned by the next `withdraw` calls, in order
    pub withdraw_errors: Mutex<Vec<String>>,
    pub withdraw_attempts: AtomicUsize,
    pub fail_cleanup: Mutex<bool>,
}

impl RecordingWriter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_withdrawals(&self, errors: &[&str]) {
        let mut queued = self.withdraw_errors.lock().unwrap();
        queued.extend(errors.iter().map(|e| e.to_string()));
    }

    pub fn withdrawals(&self) -> Vec<(u64, Withdrawal)> {
        self.withdrawals.lock().unwrap().clone()
    }

    pub fn cleanups(&self) -> Vec<(u64, u64)> {
        let mut cleanups = self.cleanups.lock().unwrap().clone();
        cleanups.sort();
        cleanups
    }
}

#[async_trait]
impl BridgeWriter for RecordingWriter {
    async fn withdraw(&self, chain: &ChainConfig, withdrawal: &Withdrawal) -> Result<()> {
        self.withdraw_attempts.fetch_add(1, Ordering::SeqCst);
        let error = {
            let mut queued = self.withdraw_errors.lock().unwrap();
            if queued.is_empty() {
                None
            } else {
                Some(queued.remove(0))
            }
        };
        if let Some(error) = error {
            return Err(eyre!(error));
        }
        self.withdrawals
            .lock()
            .unwrap()
            .push((chain.id, withdrawal.clone()));
        Ok(())
    }

    async fn deposit(&self, _chain: &ChainConfig, _value: U256, _dest: &str) -> Result<()> {
        Ok(())
    }

    async fn withdraw_to(&self, _chain: &ChainConfig, _value: U256, _dest: &str) -> Result<()> {
        Ok(())
    }

    async fn fund_bridge(&self, _chain: &ChainConfig, _value: U256) -> Result<()> {
        Ok(())
    }

    async fn pay_bridge(&self, _chain: &ChainConfig, _value: U256) -> Result<()> {
        Ok(())
    }

    async fn cleanup(&self, chain: &ChainConfig, last_block: u64) -> Result<()> {
        self.cleanups.lock().unwrap().push((chain.id, last_block));
        if *self.fail_cleanup.lock().unwrap() {
            return Err(eyre!("cleanup failed"));
        }
        Ok(())
    }
}
