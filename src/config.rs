//! Relay configuration
//!
//! Loaded from the environment (optionally via `.env`). Chains come either
//! from a JSON file named by `RELAY_CHAINS_FILE` or from numbered
//! `RELAY_CHAIN_{i}_*` variables.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{Address, B256};
use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;

use crate::context::RelayOptions;
use crate::events::EventTopics;
use crate::registry::ChainConfig;
use crate::retry::{PendingWaitConfig, RetryConfig};
use crate::rpc_fallback::parse_rpc_urls;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(eyre!("Invalid LOG_FORMAT: {} (expected text or json)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub chains: Vec<ChainConfig>,
    pub events: EventTopics,
    pub options: RelayOptions,
    pub api_bind_address: String,
    pub api_port: u16,
    pub log_format: LogFormat,
}

/// One entry of the chains JSON file
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainFileEntry {
    name: String,
    /// Primary URL, optionally followed by comma-separated fallbacks
    url: String,
    id: u64,
    contract_addr: Address,
    #[serde(default)]
    gas_price: u128,
    from: Address,
    #[serde(default)]
    nonce: u64,
    #[serde(default)]
    start_block: u64,
}

impl ChainFileEntry {
    fn into_chain(self) -> Result<ChainConfig> {
        let (rpc_url, rpc_fallback_urls) = split_urls(&self.url)
            .ok_or_else(|| eyre!("Chain {} has no RPC URL", self.name))?;
        Ok(ChainConfig {
            name: self.name,
            id: self.id,
            rpc_url,
            rpc_fallback_urls,
            contract_address: self.contract_addr,
            gas_price: self.gas_price,
            from_address: self.from,
            nonce: self.nonce,
            start_block: self.start_block,
        })
    }
}

fn split_urls(raw: &str) -> Option<(String, Vec<String>)> {
    let mut urls = parse_rpc_urls(raw);
    if urls.is_empty() {
        return None;
    }
    let primary = urls.remove(0);
    Some((primary, urls))
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_pending_timeout_secs() -> u64 {
    120
}

fn default_pending_initial_backoff_ms() -> u64 {
    250
}

fn default_pending_max_backoff_ms() -> u64 {
    5000
}

fn default_dispatch_max_retries() -> u32 {
    3
}

fn default_dead_letter_capacity() -> usize {
    1000
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_api_port() -> u16 {
    9090
}

/// Typed access to a key/value source
struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, key: &str) -> Result<String> {
        self.get(key).ok_or_else(|| eyre!("{} required", key))
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .parse()
                .map_err(|e| eyre!("Invalid {}: {} ({})", key, raw, e)),
            None => Ok(default),
        }
    }

    fn require_parsed<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.require(key)?;
        raw.parse()
            .map_err(|e| eyre!("Invalid {}: {} ({})", key, raw, e))
    }

    fn flag(&self, key: &str) -> Result<bool> {
        match self.get(key).map(|v| v.to_ascii_lowercase()) {
            None => Ok(false),
            Some(v) if v == "1" || v == "true" || v == "yes" => Ok(true),
            Some(v) if v == "0" || v == "false" || v == "no" => Ok(false),
            Some(v) => Err(eyre!("Invalid {}: {} (expected true or false)", key, v)),
        }
    }
}

impl Config {
    /// Load configuration from environment
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded .env from {:?}", path);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source; `load` uses the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let chains = match vars.get("RELAY_CHAINS_FILE") {
            Some(path) => load_chains_file(Path::new(&path))?,
            None => load_chains_from_vars(&vars)?,
        };

        let events = EventTopics {
            deposit: vars.require_parsed::<B256>("EVENT_DEPOSIT_ID")?,
            creation: vars.require_parsed::<B256>("EVENT_CREATION_ID")?,
            withdraw: vars.require_parsed::<B256>("EVENT_WITHDRAW_ID")?,
            bridge_set: vars.require_parsed::<B256>("EVENT_BRIDGE_SET_ID")?,
            bridge_funded: vars.require_parsed::<B256>("EVENT_BRIDGE_FUNDED_ID")?,
            paid: vars.require_parsed::<B256>("EVENT_PAID_ID")?,
        };

        let options = RelayOptions {
            scan_all_contracts: vars.flag("RELAY_SCAN_ALL_CONTRACTS")?,
            verbose: vars.flag("RELAY_VERBOSE")?,
            poll_interval: Duration::from_millis(
                vars.parse_or("POLL_INTERVAL_MS", default_poll_interval_ms())?,
            ),
            pending_wait: PendingWaitConfig {
                backoff: RetryConfig {
                    max_retries: u32::MAX,
                    initial_backoff: Duration::from_millis(vars.parse_or(
                        "PENDING_TX_INITIAL_BACKOFF_MS",
                        default_pending_initial_backoff_ms(),
                    )?),
                    max_backoff: Duration::from_millis(vars.parse_or(
                        "PENDING_TX_MAX_BACKOFF_MS",
                        default_pending_max_backoff_ms(),
                    )?),
                    backoff_multiplier: 2.0,
                },
                timeout: Duration::from_secs(
                    vars.parse_or("PENDING_TX_TIMEOUT_SECS", default_pending_timeout_secs())?,
                ),
            },
            dispatch_retry: RetryConfig {
                max_retries: vars
                    .parse_or("DISPATCH_MAX_RETRIES", default_dispatch_max_retries())?,
                ..RetryConfig::default()
            },
            dead_letter_capacity: vars
                .parse_or("DEAD_LETTER_CAPACITY", default_dead_letter_capacity())?,
            shutdown_timeout: Duration::from_secs(
                vars.parse_or("SHUTDOWN_TIMEOUT_SECS", default_shutdown_timeout_secs())?,
            ),
        };

        let config = Self {
            chains,
            events,
            options,
            api_bind_address: vars
                .get("API_BIND_ADDRESS")
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            api_port: vars.parse_or("API_PORT", default_api_port())?,
            log_format: vars.parse_or("LOG_FORMAT", LogFormat::default())?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks beyond the ones `ChainRegistry` and `EventCatalog` enforce
    pub fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            return Err(eyre!("No chains configured"));
        }
        for chain in &self.chains {
            if chain.contract_address == Address::ZERO {
                return Err(eyre!("Chain {} has a zero bridge address", chain.name));
            }
            for url in chain.all_rpc_urls() {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(eyre!("Chain {} RPC URL must be http(s): {}", chain.name, url));
                }
            }
        }
        if self.options.poll_interval.is_zero() {
            return Err(eyre!("POLL_INTERVAL_MS must be greater than zero"));
        }
        if self.options.pending_wait.timeout.is_zero() {
            return Err(eyre!("PENDING_TX_TIMEOUT_SECS must be greater than zero"));
        }
        if self.options.pending_wait.backoff.initial_backoff
            > self.options.pending_wait.backoff.max_backoff
        {
            return Err(eyre!(
                "PENDING_TX_INITIAL_BACKOFF_MS must not exceed PENDING_TX_MAX_BACKOFF_MS"
            ));
        }
        Ok(())
    }
}

/// Read the chain list from a JSON array
pub fn load_chains_file(path: &Path) -> Result<Vec<ChainConfig>> {
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read chains file {}", path.display()))?;
    parse_chains_json(&raw).wrap_err_with(|| format!("Invalid chains file {}", path.display()))
}

pub fn parse_chains_json(raw: &str) -> Result<Vec<ChainConfig>> {
    let entries: Vec<ChainFileEntry> = serde_json::from_str(raw)?;
    entries.into_iter().map(ChainFileEntry::into_chain).collect()
}

fn load_chains_from_vars<F>(vars: &Vars<F>) -> Result<Vec<ChainConfig>>
where
    F: Fn(&str) -> Option<String>,
{
    let count: usize = vars
        .require_parsed("RELAY_CHAINS_COUNT")
        .wrap_err("Set RELAY_CHAINS_FILE or RELAY_CHAINS_COUNT")?;

    let mut chains = Vec::with_capacity(count);
    for i in 1..=count {
        let prefix = format!("RELAY_CHAIN_{}", i);

        let name = vars
            .get(&format!("{}_NAME", prefix))
            .unwrap_or_else(|| format!("chain_{}", i));
        let id = vars.require_parsed(&format!("{}_ID", prefix))?;

        let rpc_key = format!("{}_RPC_URL", prefix);
        let (rpc_url, rpc_fallback_urls) = split_urls(&vars.require(&rpc_key)?)
            .ok_or_else(|| eyre!("{} has no URLs", rpc_key))?;

        chains.push(ChainConfig {
            name,
            id,
            rpc_url,
            rpc_fallback_urls,
            contract_address: vars.require_parsed(&format!("{}_BRIDGE_ADDRESS", prefix))?,
            gas_price: vars.parse_or(&format!("{}_GAS_PRICE", prefix), 0u128)?,
            from_address: vars.require_parsed(&format!("{}_FROM_ADDRESS", prefix))?,
            nonce: vars.parse_or(&format!("{}_NONCE", prefix), 0u64)?,
            start_block: vars.parse_or(&format!("{}_START_BLOCK", prefix), 0u64)?,
        });
    }
    Ok(chains)
}
