//! Retry and backoff utilities
//!
//! Provides exponential backoff for the finalization wait and for withdrawal
//! dispatch, plus error classification for retry decisions.

use eyre::{eyre, Result};
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate backoff duration for a given attempt (0-indexed)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Bounded wait for a transaction to leave the pending state
#[derive(Debug, Clone)]
pub struct PendingWaitConfig {
    pub backoff: RetryConfig,
    /// Give up after this long and report the deposit as unresolved
    pub timeout: Duration,
}

impl Default for PendingWaitConfig {
    fn default() -> Self {
        Self {
            backoff: RetryConfig {
                max_retries: u32::MAX,
                initial_backoff: Duration::from_millis(250),
                max_backoff: Duration::from_secs(5),
                backoff_multiplier: 2.0,
            },
            timeout: Duration::from_secs(120),
        }
    }
}

/// Classifies errors for retry decisions
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorClass {
    /// Temporary failure - should retry (RPC timeout, network issues)
    Transient,
    /// Nonce too low - already processed, do not resubmit
    NonceTooLow,
    /// Permanent failure - do not retry (invalid params, contract error)
    Permanent,
    /// Unknown error - may retry with backoff
    Unknown,
}

/// Classify an error for retry decisions
pub fn classify_error(error: &str) -> ErrorClass {
    let error_lower = error.to_lowercase();

    if error_lower.contains("timeout")
        || error_lower.contains("timed out")
        || error_lower.contains("connection")
        || error_lower.contains("network")
        || error_lower.contains("rate limit")
        || error_lower.contains("too many requests")
        || error_lower.contains("503")
        || error_lower.contains("502")
        || error_lower.contains("temporarily unavailable")
        || error_lower.contains("underpriced")
    {
        return ErrorClass::Transient;
    }

    if error_lower.contains("nonce too low")
        || error_lower.contains("already known")
        || error_lower.contains("already been processed")
    {
        return ErrorClass::NonceTooLow;
    }

    if error_lower.contains("reverted")
        || error_lower.contains("invalid signature")
        || error_lower.contains("insufficient funds")
        || error_lower.contains("out of gas")
        || error_lower.contains("invalid parameters")
        || error_lower.contains("already withdrawn")
    {
        return ErrorClass::Permanent;
    }

    ErrorClass::Unknown
}

/// Execute `operation` until it succeeds, a non-retryable error occurs, or
/// the retry budget is spent. `operation` receives the 0-indexed attempt.
pub async fn with_retry<F, T, Fut>(config: &RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let error_str = e.to_string();
                match classify_error(&error_str) {
                    ErrorClass::Permanent => {
                        warn!(error = %error_str, "Permanent error, not retrying");
                        return Err(e);
                    }
                    ErrorClass::NonceTooLow => {
                        debug!(error = %error_str, "Transaction already processed, skipping");
                        return Err(eyre!("Skipped: {}", error_str));
                    }
                    ErrorClass::Transient | ErrorClass::Unknown => {
                        if !config.should_retry(attempt) {
                            return Err(e.wrap_err(format!(
                                "giving up after {} attempts",
                                attempt + 1
                            )));
                        }
                        let backoff = config.backoff_for_attempt(attempt);
                        attempt += 1;
                        warn!(
                            attempt,
                            max = config.max_retries,
                            ?backoff,
                            error = %error_str,
                            "Retrying after backoff"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }
    }
}
