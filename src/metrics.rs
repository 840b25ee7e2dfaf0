//! Prometheus metrics for the bridge relay
//!
//! Exposed on the `/metrics` endpoint. Per-chain series are labelled with
//! `chain_id`.

use prometheus::{IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

pub struct RelayMetrics {
    pub logs_scanned_total: IntCounterVec,
    pub deposits_detected_total: IntCounterVec,
    pub withdrawals_dispatched_total: IntCounterVec,
    pub dispatch_failures_total: IntCounterVec,
    /// Deposits whose destination chain is not in the registry
    pub unrouted_deposits_total: IntCounterVec,
    /// Deposits still pending when the finalization wait timed out
    pub unresolved_deposits_total: IntCounterVec,
    pub decode_errors_total: IntCounterVec,
    /// Labelled by `chain_id` and `kind` (filter, head, head_fallback, transaction)
    pub rpc_errors_total: IntCounterVec,
    pub cursor_block: IntGaugeVec,
    pub seen_set_size: IntGauge,
    pub dead_letter_size: IntGauge,
    pub registry: Registry,
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    IntCounterVec::new(Opts::new(name, help), labels).expect("constant metric name is valid")
}

impl RelayMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let logs_scanned_total = counter_vec(
            "bridge_relay_logs_scanned_total",
            "Total number of logs returned by filter queries",
            &["chain_id"],
        );
        let deposits_detected_total = counter_vec(
            "bridge_relay_deposits_detected_total",
            "Total number of deposit events handled",
            &["chain_id"],
        );
        let withdrawals_dispatched_total = counter_vec(
            "bridge_relay_withdrawals_dispatched_total",
            "Total number of withdrawals handed to the writer, by destination chain",
            &["chain_id"],
        );
        let dispatch_failures_total = counter_vec(
            "bridge_relay_dispatch_failures_total",
            "Withdrawals the writer failed to submit, by destination chain",
            &["chain_id"],
        );
        let unrouted_deposits_total = counter_vec(
            "bridge_relay_unrouted_deposits_total",
            "Deposits naming a destination chain that is not configured",
            &["chain_id"],
        );
        let unresolved_deposits_total = counter_vec(
            "bridge_relay_unresolved_deposits_total",
            "Deposits whose transaction stayed pending past the wait timeout",
            &["chain_id"],
        );
        let decode_errors_total = counter_vec(
            "bridge_relay_decode_errors_total",
            "Transaction payloads that could not be decoded",
            &["chain_id"],
        );
        let rpc_errors_total = counter_vec(
            "bridge_relay_rpc_errors_total",
            "RPC failures by kind",
            &["chain_id", "kind"],
        );
        let cursor_block = IntGaugeVec::new(
            Opts::new("bridge_relay_cursor_block", "Current block cursor per chain"),
            &["chain_id"],
        )
        .expect("constant metric name is valid");
        let seen_set_size = IntGauge::new(
            "bridge_relay_seen_set_size",
            "Current entries in the seen-transaction set",
        )
        .expect("constant metric name is valid");
        let dead_letter_size = IntGauge::new(
            "bridge_relay_dead_letter_size",
            "Current entries in the dead-letter queue",
        )
        .expect("constant metric name is valid");

        // names are unique constants and registration runs once per instance
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(logs_scanned_total.clone()),
            Box::new(deposits_detected_total.clone()),
            Box::new(withdrawals_dispatched_total.clone()),
            Box::new(dispatch_failures_total.clone()),
            Box::new(unrouted_deposits_total.clone()),
            Box::new(unresolved_deposits_total.clone()),
            Box::new(decode_errors_total.clone()),
            Box::new(rpc_errors_total.clone()),
            Box::new(cursor_block.clone()),
            Box::new(seen_set_size.clone()),
            Box::new(dead_letter_size.clone()),
        ];
        for collector in collectors {
            registry
                .register(collector)
                .expect("metric registration must not be called twice");
        }

        Self {
            logs_scanned_total,
            deposits_detected_total,
            withdrawals_dispatched_total,
            dispatch_failures_total,
            unrouted_deposits_total,
            unresolved_deposits_total,
            decode_errors_total,
            rpc_errors_total,
            cursor_block,
            seen_set_size,
            dead_letter_size,
            registry,
        }
    }

    pub fn rpc_error(&self, chain_id: u64, kind: &str) {
        self.rpc_errors_total
            .with_label_values(&[&chain_id.to_string(), kind])
            .inc();
    }

    pub fn inc(&self, counter: &IntCounterVec, chain_id: u64) {
        counter.with_label_values(&[&chain_id.to_string()]).inc();
    }
}
