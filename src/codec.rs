//! Packed payload codec
//!
//! The bridge packs every field as exactly 32 bytes (64 hex characters),
//! big-endian and left-padded with zeroes. Deposit and withdraw transactions
//! carry the fields behind a 4-byte selector, so field offsets below are
//! expressed in hex characters of the raw transaction input.

use alloy::primitives::{Address, B256, U256};
use thiserror::Error;

/// Width of one packed field in hex characters (32 bytes)
pub const FIELD_HEX_LEN: usize = 64;

/// Recipient address slot inside the transaction input
const RECIPIENT_RANGE: (usize, usize) = (32, 72);
/// Second word: destination chain (deposit) or value (withdraw)
const SECOND_WORD_RANGE: (usize, usize) = (72, 136);
/// Third word: source chain (withdraw)
const THIRD_WORD_RANGE: (usize, usize) = (136, 200);

/// Inputs shorter than this are never treated as deposits
pub const MIN_DEPOSIT_INPUT_LEN: usize = 72;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("input has {actual} hex chars, need at least {required}")]
    InputTooShort { required: usize, actual: usize },
    #[error("packed field must be 64 hex chars, got {0}")]
    FieldWidth(usize),
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

/// Encode an unsigned integer as a packed field.
pub fn encode_u256(value: U256) -> String {
    let bytes: [u8; 32] = value.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    let minimal = hex::encode(&bytes[first..]);
    // at most 64 chars by construction
    format!("{:0>width$}", minimal, width = FIELD_HEX_LEN)
}

/// Encode an address as a packed field (12 zero bytes then the 20 address bytes).
pub fn encode_address(address: Address) -> String {
    encode_u256(U256::from_be_slice(address.as_slice()))
}

pub fn encode_hash(hash: B256) -> String {
    hex::encode(hash.as_slice())
}

/// Decode a single packed field.
pub fn decode_field(field: &str) -> Result<U256, CodecError> {
    if field.len() != FIELD_HEX_LEN {
        return Err(CodecError::FieldWidth(field.len()));
    }
    let bytes = hex::decode(field).map_err(|e| CodecError::InvalidHex(e.to_string()))?;
    Ok(U256::from_be_slice(&bytes))
}

fn decode_address(slot: &str) -> Result<Address, CodecError> {
    let bytes = hex::decode(slot).map_err(|e| CodecError::InvalidHex(e.to_string()))?;
    if bytes.len() != 20 {
        return Err(CodecError::FieldWidth(slot.len()));
    }
    Ok(Address::from_slice(&bytes))
}

fn ensure_len(input: &str, required: usize) -> Result<(), CodecError> {
    if input.len() < required {
        return Err(CodecError::InputTooShort {
            required,
            actual: input.len(),
        });
    }
    // byte offsets below must land on char boundaries
    if !input.is_ascii() {
        return Err(CodecError::InvalidHex("non-ascii input".to_string()));
    }
    Ok(())
}

fn slice(input: &str, range: (usize, usize)) -> &str {
    &input[range.0..range.1]
}

/// Fields carried by a deposit transaction. The amount is the transaction's
/// native value and is not part of the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositPayload {
    pub recipient: Address,
    pub dest_chain: U256,
}

impl DepositPayload {
    /// Decode from the hex-encoded transaction input (no 0x prefix).
    pub fn decode(input: &str) -> Result<Self, CodecError> {
        if input.len() <= MIN_DEPOSIT_INPUT_LEN {
            return Err(CodecError::InputTooShort {
                required: MIN_DEPOSIT_INPUT_LEN + 1,
                actual: input.len(),
            });
        }
        ensure_len(input, SECOND_WORD_RANGE.1)?;

        Ok(Self {
            recipient: decode_address(slice(input, RECIPIENT_RANGE))?,
            dest_chain: decode_field(slice(input, SECOND_WORD_RANGE))?,
        })
    }
}

/// Fields carried by a withdraw transaction, decoded for reporting only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawPayload {
    pub recipient: Address,
    pub value: U256,
    pub source_chain: U256,
}

impl WithdrawPayload {
    pub fn decode(input: &str) -> Result<Self, CodecError> {
        ensure_len(input, THIRD_WORD_RANGE.1)?;

        Ok(Self {
            recipient: decode_address(slice(input, RECIPIENT_RANGE))?,
            value: decode_field(slice(input, SECOND_WORD_RANGE))?,
            source_chain: decode_field(slice(input, THIRD_WORD_RANGE))?,
        })
    }
}
