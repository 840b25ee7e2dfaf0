//! Shared relay state handed to every listener

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::dead_letter::{DeadLetterQueue, DEFAULT_DEAD_LETTER_CAPACITY};
use crate::events::EventCatalog;
use crate::metrics::RelayMetrics;
use crate::registry::ChainRegistry;
use crate::retry::{PendingWaitConfig, RetryConfig};
use crate::seen::SeenTransactions;
use crate::server::{AppState, RelayStatus, SharedStatus};
use crate::writer::BridgeWriter;

/// Runtime switches and tuning
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Filter logs from every contract instead of only the bridge
    pub scan_all_contracts: bool,
    /// Log unrecognized topics
    pub verbose: bool,
    pub poll_interval: Duration,
    pub pending_wait: PendingWaitConfig,
    pub dispatch_retry: RetryConfig,
    pub dead_letter_capacity: usize,
    pub shutdown_timeout: Duration,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            scan_all_contracts: false,
            verbose: false,
            poll_interval: Duration::from_millis(1000),
            pending_wait: PendingWaitConfig::default(),
            dispatch_retry: RetryConfig::default(),
            dead_letter_capacity: DEFAULT_DEAD_LETTER_CAPACITY,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Everything the listeners, dispatchers and deposit handlers share.
///
/// The registry and event catalog are read-only after construction; the seen
/// set and dead-letter queue carry their own locks.
pub struct RelayContext {
    pub registry: Arc<ChainRegistry>,
    pub events: EventCatalog,
    pub seen: SeenTransactions,
    pub writer: Arc<dyn BridgeWriter>,
    pub dead_letters: Arc<DeadLetterQueue>,
    pub metrics: Arc<RelayMetrics>,
    pub status: SharedStatus,
    pub options: RelayOptions,
}

impl RelayContext {
    pub fn new(
        registry: Arc<ChainRegistry>,
        events: EventCatalog,
        writer: Arc<dyn BridgeWriter>,
        options: RelayOptions,
    ) -> Self {
        let status = Arc::new(RwLock::new(RelayStatus::for_registry(&registry)));
        Self {
            registry,
            events,
            seen: SeenTransactions::new(),
            writer,
            dead_letters: Arc::new(DeadLetterQueue::new(options.dead_letter_capacity)),
            metrics: Arc::new(RelayMetrics::new()),
            status,
            options,
        }
    }

    /// State for the HTTP server
    pub fn app_state(&self) -> AppState {
        AppState {
            status: self.status.clone(),
            metrics: self.metrics.clone(),
            dead_letters: self.dead_letters.clone(),
        }
    }
}
