//! Common types shared by the listener, dispatcher and deposit handler

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::rpc::types::Log;
use eyre::{eyre, Result};
use serde::Serialize;

use crate::codec;

/// One on-chain log entry returned by a filter query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub tx_hash: B256,
    /// Emitting contract
    pub address: Address,
    pub block_number: u64,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

impl TryFrom<&Log> for LogRecord {
    type Error = eyre::Report;

    fn try_from(log: &Log) -> Result<Self> {
        let tx_hash = log
            .transaction_hash
            .ok_or_else(|| eyre!("Missing transaction hash"))?;
        let block_number = log
            .block_number
            .ok_or_else(|| eyre!("Missing block number"))?;

        Ok(Self {
            tx_hash,
            address: log.address(),
            block_number,
            topics: log.topics().to_vec(),
            data: log.data().data.clone(),
        })
    }
}

/// The subset of a transaction the relay needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInfo {
    pub hash: B256,
    pub input: Bytes,
    /// Native value transferred
    pub value: U256,
    /// True until the transaction is included in a block
    pub is_pending: bool,
}

impl TransactionInfo {
    /// Transaction input as lowercase hex without a 0x prefix
    pub fn input_hex(&self) -> String {
        hex::encode(&self.input)
    }
}

/// A decoded transfer intent, released on `dest_chain`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Withdrawal {
    pub recipient: Address,
    pub value: U256,
    /// Chain the funds are released on, as decoded from the deposit payload
    pub dest_chain: U256,
    /// Originating deposit transaction
    pub tx_hash: B256,
    /// Packed payload for onward submission
    pub data: String,
}

impl Withdrawal {
    pub fn new(recipient: Address, value: U256, dest_chain: U256, tx_hash: B256) -> Self {
        let data = format!(
            "{}{}{}{}",
            codec::encode_address(recipient),
            codec::encode_u256(value),
            codec::encode_u256(dest_chain),
            codec::encode_hash(tx_hash),
        );

        Self {
            recipient,
            value,
            dest_chain,
            tx_hash,
            data,
        }
    }

    /// Destination as a registry chain id, if it fits
    pub fn dest_chain_id(&self) -> Option<u64> {
        u64::try_from(self.dest_chain).ok()
    }
}
