//! RPC URL handling and the raw `eth_blockNumber` fallback.
//!
//! When the alloy provider cannot report the head block, the listener asks
//! each configured endpoint directly over JSON-RPC, primary first.

use alloy::providers::{ProviderBuilder, RootProvider};
use alloy::transports::http::{Client, Http};
use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Parse a comma-separated RPC URL string into individual trimmed URLs.
pub fn parse_rpc_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Create an alloy HTTP provider for one RPC URL.
pub fn create_provider(url: &str) -> Result<RootProvider<Http<Client>>> {
    let parsed = url
        .parse()
        .wrap_err_with(|| format!("Invalid RPC URL: {}", url))?;
    Ok(ProviderBuilder::new().on_http(parsed))
}

/// Parse a JSON-RPC hex quantity ("0x1b4") into a u64.
pub fn parse_hex_quantity(raw: &str) -> Result<u64> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    if digits.is_empty() {
        return Err(eyre!("Empty hex quantity"));
    }
    u64::from_str_radix(digits, 16).wrap_err_with(|| format!("Invalid hex quantity: {}", raw))
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i32,
    message: String,
}

/// Raw JSON-RPC client used when the provider path fails
#[derive(Debug, Clone)]
pub struct RawBlockNumberClient {
    client: reqwest::Client,
    urls: Vec<String>,
}

impl RawBlockNumberClient {
    pub fn new(urls: Vec<String>) -> Result<Self> {
        if urls.is_empty() {
            return Err(eyre!("At least one RPC URL is required"));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, urls })
    }

    /// Try every URL in order; first success wins.
    pub async fn block_number(&self) -> Result<u64> {
        let mut last_error = None;
        for url in &self.urls {
            match self.block_number_at(url).await {
                Ok(block) => {
                    debug!(url = %url, block, "Raw eth_blockNumber succeeded");
                    return Ok(block);
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Raw eth_blockNumber failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| eyre!("No RPC URLs configured")))
    }

    async fn block_number_at(&self, url: &str) -> Result<u64> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "eth_blockNumber",
            "params": [],
            "id": 1
        });

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<RpcResponse<String>>()
            .await?;

        if let Some(error) = response.error {
            return Err(eyre!("RPC error {}: {}", error.code, error.message));
        }

        let result = response
            .result
            .ok_or_else(|| eyre!("eth_blockNumber returned no result"))?;
        parse_hex_quantity(&result)
    }
}
