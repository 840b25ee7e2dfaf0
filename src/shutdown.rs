//! Shutdown Coordinator
//!
//! Owns the listener tasks. On a termination signal every listener is told to
//! stop, runs its cleanup hook and reports back; the coordinator waits for all
//! of them up to a deadline.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::listener::{ChainListener, ListenerExit};

/// Receiver side handed to each listener
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once shutdown is requested or the coordinator is gone
    pub async fn triggered(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    pub acknowledged: Vec<ListenerExit>,
    /// Chains whose listener did not report back in time
    pub missing: Vec<u64>,
    pub timed_out: bool,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        !self.timed_out && self.missing.is_empty() && self.acknowledged.iter().all(|e| e.cleanup_ok)
    }
}

pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
    listeners: JoinSet<ListenerExit>,
    expected: BTreeSet<u64>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(timeout: Duration) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            tx,
            listeners: JoinSet::new(),
            expected: BTreeSet::new(),
            timeout,
        }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Run a listener on its own task until shutdown
    pub fn spawn(&mut self, listener: ChainListener) {
        self.expected.insert(listener.chain_id());
        let signal = self.signal();
        self.listeners.spawn(listener.run(signal));
    }

    pub fn listener_count(&self) -> usize {
        self.expected.len()
    }

    /// Stop every listener and wait for their acknowledgements
    pub async fn shutdown(mut self) -> ShutdownReport {
        info!(listeners = self.expected.len(), "Broadcasting shutdown");
        self.tx.send_replace(true);

        let mut acknowledged = Vec::new();
        let listeners = &mut self.listeners;
        let collected = tokio::time::timeout(self.timeout, async {
            while let Some(joined) = listeners.join_next().await {
                match joined {
                    Ok(exit) => {
                        info!(
                            chain_id = exit.chain_id,
                            last_block = exit.last_block,
                            cleanup_ok = exit.cleanup_ok,
                            "Listener acknowledged shutdown"
                        );
                        acknowledged.push(exit);
                    }
                    Err(e) => error!(error = %e, "Listener task failed"),
                }
            }
        })
        .await;

        let timed_out = collected.is_err();
        if timed_out {
            warn!(timeout = ?self.timeout, "Shutdown timed out, aborting remaining listeners");
            self.listeners.abort_all();
        }

        let acked: BTreeSet<u64> = acknowledged.iter().map(|e| e.chain_id).collect();
        let missing = self.expected.difference(&acked).copied().collect();

        ShutdownReport {
            acknowledged,
            missing,
            timed_out,
        }
    }
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
pub async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
