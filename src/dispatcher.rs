//! Log Dispatcher
//!
//! Routes every topic of every new log to its handler. A transaction is
//! handled at most once: its hash is checked against the shared seen set
//! before any topic is looked at, and marked after all of them are.

use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use tracing::{info, warn};

use crate::codec::WithdrawPayload;
use crate::context::RelayContext;
use crate::deposit::{wait_for_transaction, DepositHandler, DepositOutcome};
use crate::events::EventKind;
use crate::registry::ChainConfig;
use crate::rpc::ChainRpc;
use crate::types::LogRecord;

/// Decoded withdraw transaction, reported and otherwise left alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawReport {
    pub tx_hash: B256,
    pub recipient: Address,
    pub value: U256,
    pub source_chain: U256,
}

/// What one filter batch amounted to
#[derive(Debug, Clone, Default)]
pub struct DispatchSummary {
    pub logs_received: usize,
    /// Logs whose transaction had already been handled
    pub already_seen: usize,
    pub processed: usize,
    pub deposits: Vec<DepositOutcome>,
    pub withdrawals: Vec<WithdrawReport>,
    /// Creation, BridgeSet, BridgeFunded and Paid events
    pub informational: Vec<(B256, EventKind)>,
    pub unknown_topics: usize,
}

impl DispatchSummary {
    pub fn dispatched_count(&self) -> usize {
        self.deposits.iter().filter(|d| d.is_dispatched()).count()
    }
}

pub struct LogDispatcher {
    ctx: Arc<RelayContext>,
    chain: Arc<ChainConfig>,
    deposits: DepositHandler,
}

impl LogDispatcher {
    pub fn new(ctx: Arc<RelayContext>, chain: Arc<ChainConfig>) -> Self {
        Self {
            deposits: DepositHandler::new(ctx.clone()),
            ctx,
            chain,
        }
    }

    /// Handle a batch in order. Deposits are awaited one at a time.
    pub async fn dispatch(&self, rpc: &dyn ChainRpc, logs: &[LogRecord]) -> DispatchSummary {
        let mut summary = DispatchSummary {
            logs_received: logs.len(),
            ..DispatchSummary::default()
        };
        let chain_id = self.chain.id;

        for log in logs {
            if self.ctx.seen.contains(&log.tx_hash).await {
                summary.already_seen += 1;
                continue;
            }

            for topic in &log.topics {
                match self.ctx.events.classify(topic) {
                    Some(EventKind::Deposit) => {
                        info!(
                            chain_id,
                            block = log.block_number,
                            tx_hash = %log.tx_hash,
                            "Deposit event"
                        );
                        let outcome = self.deposits.handle(&self.chain, rpc, log.tx_hash).await;
                        summary.deposits.push(outcome);
                    }
                    Some(EventKind::Withdraw) => {
                        if let Some(report) = self.report_withdraw(rpc, log.tx_hash).await {
                            summary.withdrawals.push(report);
                        }
                    }
                    Some(kind) => {
                        info!(
                            chain_id,
                            block = log.block_number,
                            tx_hash = %log.tx_hash,
                            event = %kind,
                            "Bridge event"
                        );
                        summary.informational.push((log.tx_hash, kind));
                    }
                    None => {
                        summary.unknown_topics += 1;
                        if self.ctx.options.verbose {
                            info!(
                                chain_id,
                                tx_hash = %log.tx_hash,
                                topic = %topic,
                                "Unrecognized topic"
                            );
                        }
                    }
                }
            }

            self.ctx
                .seen
                .mark(chain_id, log.block_number, log.tx_hash)
                .await;
            summary.processed += 1;
        }

        if summary.processed > 0 {
            self.ctx
                .metrics
                .seen_set_size
                .set(self.ctx.seen.len().await as i64);
        }
        summary
    }

    async fn report_withdraw(&self, rpc: &dyn ChainRpc, tx_hash: B256) -> Option<WithdrawReport> {
        let chain_id = self.chain.id;
        let tx = match wait_for_transaction(
            rpc,
            chain_id,
            tx_hash,
            &self.ctx.options.pending_wait,
            &self.ctx.metrics,
        )
        .await
        {
            Ok(tx) => tx,
            Err(e) => {
                warn!(chain_id, error = %e, "Withdraw transaction unresolved");
                return None;
            }
        };

        match WithdrawPayload::decode(&tx.input_hex()) {
            Ok(payload) => {
                info!(
                    chain_id,
                    tx_hash = %tx_hash,
                    recipient = %payload.recipient,
                    value = %payload.value,
                    source_chain = %payload.source_chain,
                    "Withdraw event"
                );
                Some(WithdrawReport {
                    tx_hash,
                    recipient: payload.recipient,
                    value: payload.value,
                    source_chain: payload.source_chain,
                })
            }
            Err(e) => {
                self.ctx
                    .metrics
                    .inc(&self.ctx.metrics.decode_errors_total, chain_id);
                warn!(chain_id, tx_hash = %tx_hash, error = %e, "Malformed withdraw payload");
                None
            }
        }
    }
}
