//! Deposit handling: wait, decode, route, dispatch.
//!
//! A deposit on one chain becomes a withdrawal on the chain named in its
//! payload. The handler keeps no state between invocations; every outcome is
//! returned to the dispatcher as a [`DepositOutcome`].

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::B256;
use chrono::Utc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::codec::{CodecError, DepositPayload};
use crate::context::RelayContext;
use crate::dead_letter::{DeadLetter, DeadLetterReason};
use crate::metrics::RelayMetrics;
use crate::registry::ChainConfig;
use crate::retry::{with_retry, PendingWaitConfig};
use crate::rpc::ChainRpc;
use crate::types::{TransactionInfo, Withdrawal};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("transaction {tx_hash} still pending after {waited:?}")]
    Timeout { tx_hash: B256, waited: Duration },
}

/// Poll until the transaction is included in a block.
///
/// Unknown transactions and RPC errors count as "not yet"; only the overall
/// timeout ends the wait. RPC errors are counted under the `transaction` kind.
pub async fn wait_for_transaction(
    rpc: &dyn ChainRpc,
    chain_id: u64,
    tx_hash: B256,
    policy: &PendingWaitConfig,
    metrics: &RelayMetrics,
) -> Result<TransactionInfo, WaitError> {
    let started = Instant::now();
    let mut attempt = 0u32;

    loop {
        match rpc.transaction_by_hash(tx_hash).await {
            Ok(Some(tx)) if !tx.is_pending => return Ok(tx),
            Ok(Some(_)) => debug!(tx_hash = %tx_hash, attempt, "Transaction pending"),
            Ok(None) => debug!(tx_hash = %tx_hash, attempt, "Transaction not found yet"),
            Err(e) => {
                metrics.rpc_error(chain_id, "transaction");
                warn!(chain_id, tx_hash = %tx_hash, error = %e, "Failed to fetch transaction");
            }
        }

        let elapsed = started.elapsed();
        if elapsed >= policy.timeout {
            return Err(WaitError::Timeout {
                tx_hash,
                waited: elapsed,
            });
        }
        let backoff = policy
            .backoff
            .backoff_for_attempt(attempt)
            .min(policy.timeout - elapsed);
        attempt = attempt.saturating_add(1);
        tokio::time::sleep(backoff).await;
    }
}

#[derive(Debug, Clone)]
pub enum DepositOutcome {
    /// Withdrawal accepted by the writer on `target_chain`
    Dispatched {
        withdrawal: Withdrawal,
        target_chain: u64,
    },
    /// Destination chain is not configured; dead-lettered
    UnknownDestination { withdrawal: Withdrawal },
    /// Transaction never left the pending state; dead-lettered
    Unresolved { tx_hash: B256, waited: Duration },
    /// Transaction input is not a deposit payload; dead-lettered
    Malformed { tx_hash: B256, error: CodecError },
    /// Writer failed permanently or retries ran out; dead-lettered
    DispatchFailed {
        withdrawal: Withdrawal,
        target_chain: u64,
        error: String,
    },
}

impl DepositOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, DepositOutcome::Dispatched { .. })
    }
}

#[derive(Clone)]
pub struct DepositHandler {
    ctx: Arc<RelayContext>,
}

impl DepositHandler {
    pub fn new(ctx: Arc<RelayContext>) -> Self {
        Self { ctx }
    }

    pub async fn handle(
        &self,
        source: &ChainConfig,
        rpc: &dyn ChainRpc,
        tx_hash: B256,
    ) -> DepositOutcome {
        let metrics = &self.ctx.metrics;
        metrics.inc(&metrics.deposits_detected_total, source.id);

        let tx = match wait_for_transaction(
            rpc,
            source.id,
            tx_hash,
            &self.ctx.options.pending_wait,
            metrics,
        )
        .await
        {
            Ok(tx) => tx,
            Err(WaitError::Timeout { waited, .. }) => {
                metrics.inc(&metrics.unresolved_deposits_total, source.id);
                error!(
                    chain_id = source.id,
                    tx_hash = %tx_hash,
                    ?waited,
                    "ALERT: deposit transaction still pending, dead-lettered"
                );
                self.dead_letter(
                    source,
                    tx_hash,
                    None,
                    DeadLetterReason::Unresolved,
                    Some(format!("still pending after {:?}", waited)),
                )
                .await;
                return DepositOutcome::Unresolved { tx_hash, waited };
            }
        };

        let payload = match DepositPayload::decode(&tx.input_hex()) {
            Ok(payload) => payload,
            Err(e) => {
                metrics.inc(&metrics.decode_errors_total, source.id);
                error!(
                    chain_id = source.id,
                    tx_hash = %tx_hash,
                    error = %e,
                    "ALERT: malformed deposit payload, dead-lettered"
                );
                self.dead_letter(
                    source,
                    tx_hash,
                    None,
                    DeadLetterReason::Malformed,
                    Some(e.to_string()),
                )
                .await;
                return DepositOutcome::Malformed { tx_hash, error: e };
            }
        };

        let withdrawal = Withdrawal::new(payload.recipient, tx.value, payload.dest_chain, tx_hash);
        info!(
            chain_id = source.id,
            tx_hash = %tx_hash,
            recipient = %withdrawal.recipient,
            value = %withdrawal.value,
            dest_chain = %withdrawal.dest_chain,
            "Deposit decoded"
        );

        let target = withdrawal
            .dest_chain_id()
            .and_then(|id| self.ctx.registry.find_by_id(id));
        let Some(target) = target else {
            metrics.inc(&metrics.unrouted_deposits_total, source.id);
            error!(
                chain_id = source.id,
                tx_hash = %tx_hash,
                dest_chain = %withdrawal.dest_chain,
                "ALERT: deposit targets an unknown chain, dead-lettered"
            );
            self.dead_letter(
                source,
                tx_hash,
                Some(&withdrawal),
                DeadLetterReason::UnknownDestination,
                None,
            )
            .await;
            return DepositOutcome::UnknownDestination { withdrawal };
        };

        let result = with_retry(&self.ctx.options.dispatch_retry, |_| {
            self.ctx.writer.withdraw(target, &withdrawal)
        })
        .await;

        match result {
            Ok(()) => {
                metrics.inc(&metrics.withdrawals_dispatched_total, target.id);
                info!(
                    source_chain = source.id,
                    target_chain = target.id,
                    tx_hash = %tx_hash,
                    "Withdrawal dispatched"
                );
                DepositOutcome::Dispatched {
                    withdrawal,
                    target_chain: target.id,
                }
            }
            Err(e) => {
                let message = format!("{:#}", e);
                metrics.inc(&metrics.dispatch_failures_total, target.id);
                error!(
                    source_chain = source.id,
                    target_chain = target.id,
                    tx_hash = %tx_hash,
                    error = %message,
                    "ALERT: withdrawal dispatch failed, dead-lettered"
                );
                self.dead_letter(
                    source,
                    tx_hash,
                    Some(&withdrawal),
                    DeadLetterReason::DispatchFailed,
                    Some(message.clone()),
                )
                .await;
                DepositOutcome::DispatchFailed {
                    withdrawal,
                    target_chain: target.id,
                    error: message,
                }
            }
        }
    }

    async fn dead_letter(
        &self,
        source: &ChainConfig,
        tx_hash: B256,
        withdrawal: Option<&Withdrawal>,
        reason: DeadLetterReason,
        error: Option<String>,
    ) {
        let len = self
            .ctx
            .dead_letters
            .push(DeadLetter {
                source_chain: source.id,
                tx_hash,
                withdrawal: withdrawal.cloned(),
                reason,
                error,
                at: Utc::now(),
            })
            .await;
        self.ctx.metrics.dead_letter_size.set(len as i64);
    }
}
