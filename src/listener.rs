//! Per-Chain Listener
//!
//! One polling loop per chain. Each tick filters logs and, at the same time,
//! fetches the head block; the cursor moves to the head once both are done.
//!
//! The filter runs up to "latest" as the node sees it when the query lands,
//! which can be older than the head fetched alongside it. The next filter
//! therefore starts at the cursor the previous tick began with (a head that
//! was observed before this tick's filter went out) rather than at the new
//! head. Scans overlap on purpose and the shared seen set keeps them
//! idempotent; entries below the scan start are pruned after each tick.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::context::RelayContext;
use crate::dispatcher::{DispatchSummary, LogDispatcher};
use crate::registry::ChainConfig;
use crate::rpc::ChainRpc;
use crate::shutdown::ShutdownSignal;

/// Acknowledgement returned when a listener stops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerExit {
    pub chain_id: u64,
    pub chain_name: String,
    /// Cursor handed to the cleanup hook
    pub last_block: u64,
    pub cleanup_ok: bool,
}

/// Result of a single polling tick
#[derive(Debug, Clone)]
pub struct TickReport {
    /// `None` when the log filter failed
    pub summary: Option<DispatchSummary>,
    /// `None` when both head paths failed
    pub head: Option<u64>,
    pub cursor: u64,
    /// Where the next filter starts
    pub scan_from: u64,
}

pub struct ChainListener {
    chain: Arc<ChainConfig>,
    rpc: Arc<dyn ChainRpc>,
    ctx: Arc<RelayContext>,
    dispatcher: LogDispatcher,
    cursor: u64,
    /// First block of the next filter; never moves backwards
    scan_from: u64,
}

impl ChainListener {
    pub fn new(chain: Arc<ChainConfig>, rpc: Arc<dyn ChainRpc>, ctx: Arc<RelayContext>) -> Self {
        Self {
            dispatcher: LogDispatcher::new(ctx.clone(), chain.clone()),
            cursor: chain.start_block,
            scan_from: chain.start_block,
            chain,
            rpc,
            ctx,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain.id
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn scan_from(&self) -> u64 {
        self.scan_from
    }

    /// Poll once: dispatch new logs and advance the cursor.
    pub async fn tick(&mut self) -> TickReport {
        let from_block = self.scan_from;
        let (summary, head) = tokio::join!(self.filter_and_dispatch(from_block), self.fetch_head());

        // a failed filter leaves the scan start where it was
        if summary.is_some() {
            self.scan_from = self.scan_from.max(self.cursor);
        }
        if let Some(head) = head {
            if head != self.cursor {
                debug!(chain_id = self.chain.id, from = self.cursor, to = head, "Advancing cursor");
                self.cursor = head;
            }
        }

        let pruned = self.ctx.seen.prune_below(self.chain.id, self.scan_from).await;
        if pruned > 0 {
            debug!(chain_id = self.chain.id, pruned, below = self.scan_from, "Pruned seen set");
            self.ctx
                .metrics
                .seen_set_size
                .set(self.ctx.seen.len().await as i64);
        }

        self.publish(summary.as_ref(), head.is_some()).await;

        TickReport {
            summary,
            head,
            cursor: self.cursor,
            scan_from: self.scan_from,
        }
    }

    async fn filter_and_dispatch(&self, from_block: u64) -> Option<DispatchSummary> {
        let address = if self.ctx.options.scan_all_contracts {
            None
        } else {
            Some(self.chain.contract_address)
        };

        let logs = match self.rpc.filter_logs(from_block, address).await {
            Ok(logs) => logs,
            Err(e) => {
                self.ctx.metrics.rpc_error(self.chain.id, "filter");
                warn!(chain_id = self.chain.id, from_block, error = %e, "Log filter failed");
                return None;
            }
        };

        if logs.is_empty() {
            return Some(DispatchSummary::default());
        }

        self.ctx
            .metrics
            .logs_scanned_total
            .with_label_values(&[&self.chain.id.to_string()])
            .inc_by(logs.len() as u64);

        let summary = self.dispatcher.dispatch(self.rpc.as_ref(), &logs).await;
        debug!(
            chain_id = self.chain.id,
            from_block,
            logs = summary.logs_received,
            already_seen = summary.already_seen,
            dispatched = summary.dispatched_count(),
            "Batch dispatched"
        );
        Some(summary)
    }

    async fn fetch_head(&self) -> Option<u64> {
        let chain_id = self.chain.id;
        match self.rpc.block_number().await {
            Ok(head) => return Some(head),
            Err(e) => {
                self.ctx.metrics.rpc_error(chain_id, "head");
                warn!(chain_id, error = %e, "Head block query failed, trying raw fallback");
            }
        }

        match self.rpc.fallback_block_number().await {
            Ok(head) => Some(head),
            Err(e) => {
                self.ctx.metrics.rpc_error(chain_id, "head_fallback");
                error!(chain_id, cursor = self.cursor, error = %e, "Cannot determine head block");
                None
            }
        }
    }

    async fn publish(&self, summary: Option<&DispatchSummary>, head_ok: bool) {
        self.ctx
            .metrics
            .cursor_block
            .with_label_values(&[&self.chain.id.to_string()])
            .set(self.cursor as i64);

        let mut status = self.ctx.status.write().await;
        let entry = status.chain_mut(self.chain.id, &self.chain.name);
        entry.cursor = self.cursor;
        entry.last_poll = Some(Utc::now());
        if head_ok {
            entry.consecutive_head_failures = 0;
        } else {
            entry.consecutive_head_failures += 1;
        }
        if let Some(summary) = summary {
            entry.logs_dispatched += summary.processed as u64;
            entry.deposits_handled += summary.deposits.len() as u64;
        }
    }

    /// Poll until shutdown, then run the cleanup hook with the final cursor.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> ListenerExit {
        let poll_interval = self.ctx.options.poll_interval;
        info!(
            chain = %self.chain.name,
            chain_id = self.chain.id,
            start_block = self.cursor,
            scan_all = self.ctx.options.scan_all_contracts,
            "Listener started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                _ = self.tick() => {}
            }
            tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        info!(chain_id = self.chain.id, cursor = self.cursor, "Listener stopping");
        let cleanup_ok = match self.ctx.writer.cleanup(&self.chain, self.cursor).await {
            Ok(()) => true,
            Err(e) => {
                error!(chain_id = self.chain.id, error = %e, "Cleanup failed");
                false
            }
        };

        ListenerExit {
            chain_id: self.chain.id,
            chain_name: self.chain.name.clone(),
            last_block: self.cursor,
            cleanup_ok,
        }
    }
}
