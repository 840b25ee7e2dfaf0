//! HTTP server for health, metrics and dead-letter inspection

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use eyre::eyre;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::info;

use crate::dead_letter::{DeadLetter, DeadLetterQueue};
use crate::metrics::RelayMetrics;
use crate::registry::ChainRegistry;

/// Per-chain listener state published for the health endpoint
#[derive(Debug, Default, Clone, Serialize)]
pub struct ChainStatus {
    pub name: String,
    pub cursor: u64,
    pub last_poll: Option<DateTime<Utc>>,
    /// Ticks in a row where neither head path answered
    pub consecutive_head_failures: u32,
    pub logs_dispatched: u64,
    pub deposits_handled: u64,
}

/// Status of every listener, keyed by chain id
#[derive(Debug, Default, Clone, Serialize)]
pub struct RelayStatus {
    pub chains: BTreeMap<u64, ChainStatus>,
}

impl RelayStatus {
    /// One entry per configured chain, none polled yet
    pub fn for_registry(registry: &ChainRegistry) -> Self {
        let mut status = Self::default();
        for chain in registry.iter() {
            status.chain_mut(chain.id, &chain.name);
        }
        status
    }

    pub fn chain_mut(&mut self, chain_id: u64, name: &str) -> &mut ChainStatus {
        self.chains.entry(chain_id).or_insert_with(|| ChainStatus {
            name: name.to_string(),
            ..ChainStatus::default()
        })
    }

    /// Ready once every registered listener has completed a poll
    pub fn is_ready(&self) -> bool {
        !self.chains.is_empty() && self.chains.values().all(|c| c.last_poll.is_some())
    }
}

pub type SharedStatus = Arc<RwLock<RelayStatus>>;

#[derive(Clone)]
pub struct AppState {
    pub status: SharedStatus,
    pub metrics: Arc<RelayMetrics>,
    pub dead_letters: Arc<DeadLetterQueue>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub chains: Vec<ChainHealth>,
    pub dead_letters: usize,
}

#[derive(Serialize)]
pub struct ChainHealth {
    pub chain_id: u64,
    #[serde(flatten)]
    pub status: ChainStatus,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.status.read().await;
    let degraded = status
        .chains
        .values()
        .any(|c| c.consecutive_head_failures > 0);
    let chains = status
        .chains
        .iter()
        .map(|(id, c)| ChainHealth {
            chain_id: *id,
            status: c.clone(),
        })
        .collect();
    drop(status);

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "healthy" }.to_string(),
        chains,
        dead_letters: state.dead_letters.len().await,
    })
}

/// Liveness probe (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

async fn readiness(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.status.read().await.is_ready() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY")
    }
}

async fn dead_letters(State(state): State<AppState>) -> Json<Vec<DeadLetter>> {
    Json(state.dead_letters.snapshot().await)
}

async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    let status = state.status.read().await;
    for (id, chain) in &status.chains {
        state
            .metrics
            .cursor_block
            .with_label_values(&[&id.to_string()])
            .set(chain.cursor as i64);
    }
    drop(status);
    state
        .metrics
        .dead_letter_size
        .set(state.dead_letters.len().await as i64);

    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry.gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response();
    }

    match Response::builder()
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .route("/dead-letters", get(dead_letters))
        .with_state(state)
}

/// Serve on an already-bound listener
pub async fn serve(listener: TcpListener, state: AppState) -> eyre::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Start the HTTP server for health and metrics
pub async fn start_server(bind_address: &str, port: u16, state: AppState) -> eyre::Result<()> {
    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}:{}: {}", bind_address, port, e))?;
    info!("Health server listening on {}", addr);
    info!("  /health       - Per-chain status (JSON)");
    info!("  /metrics      - Prometheus metrics");
    info!("  /dead-letters - Undelivered withdrawals (JSON)");

    let listener = TcpListener::bind(addr).await?;
    serve(listener, state).await
}
