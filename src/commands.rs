//! Operator commands
//!
//! One-shot actions an operator runs against a configured chain: deposit,
//! withdraw-to, fund the bridge, pay the bridge.

use alloy::primitives::U256;
use eyre::{eyre, Result};
use tracing::info;

use crate::registry::{ChainConfig, ChainRegistry};
use crate::writer::BridgeWriter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Lock `value` on `chain` for release on chain `to`
    Deposit { chain: String, value: U256, to: u64 },
    WithdrawTo { chain: String, value: U256, to: u64 },
    Fund { chain: String, value: U256 },
    Pay { chain: String, value: U256 },
}

impl OperatorCommand {
    pub fn chain_name(&self) -> &str {
        match self {
            OperatorCommand::Deposit { chain, .. }
            | OperatorCommand::WithdrawTo { chain, .. }
            | OperatorCommand::Fund { chain, .. }
            | OperatorCommand::Pay { chain, .. } => chain,
        }
    }
}

fn resolve<'a>(registry: &'a ChainRegistry, name: &str) -> Result<&'a ChainConfig> {
    registry
        .find_by_name(name)
        .map(|c| c.as_ref())
        .ok_or_else(|| eyre!("Unknown chain: {}", name))
}

/// Destination id as the bare hex string the bridge expects
fn destination_hex(registry: &ChainRegistry, to: u64) -> Result<String> {
    if registry.find_by_id(to).is_none() {
        return Err(eyre!("Destination chain {} is not configured", to));
    }
    Ok(format!("{:x}", to))
}

pub async fn execute(
    command: &OperatorCommand,
    registry: &ChainRegistry,
    writer: &dyn BridgeWriter,
) -> Result<()> {
    let chain = resolve(registry, command.chain_name())?;

    match command {
        OperatorCommand::Deposit { value, to, .. } => {
            let dest = destination_hex(registry, *to)?;
            info!(chain = %chain.name, %value, to, "Submitting deposit");
            writer.deposit(chain, *value, &dest).await
        }
        OperatorCommand::WithdrawTo { value, to, .. } => {
            let dest = destination_hex(registry, *to)?;
            info!(chain = %chain.name, %value, to, "Submitting withdraw-to");
            writer.withdraw_to(chain, *value, &dest).await
        }
        OperatorCommand::Fund { value, .. } => {
            info!(chain = %chain.name, %value, "Funding bridge");
            writer.fund_bridge(chain, *value).await
        }
        OperatorCommand::Pay { value, .. } => {
            info!(chain = %chain.name, %value, "Paying bridge");
            writer.pay_bridge(chain, *value).await
        }
    }
}
