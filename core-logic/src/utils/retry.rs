//! # Core Logic - Retry Policy
//!
//! Bounded retries with a randomized pause between attempts. The policy is
//! passed explicitly to every call site that needs it.

use crate::config::DelayRange;
use anyhow::{Context, Result};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub attempts: u32,
    pub delay: DelayRange,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: DelayRange {
                min_secs: 5,
                max_secs: 10,
            },
        }
    }
}

impl RetryConfig {
    pub fn new(attempts: u32, delay: DelayRange) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Same attempt count, no pause between attempts.
    pub fn without_delay(mut self) -> Self {
        self.delay = DelayRange::zero();
        self
    }

    fn next_delay(&self) -> Duration {
        self.delay.sample()
    }
}

/// Runs `operation` until it succeeds or the attempts are exhausted.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = config.attempts;
    with_retry_if(config, operation_name, |_| true, operation)
        .await
        .with_context(|| format!("{} failed after {} attempts", operation_name, attempts))
}

/// Like [`with_retry`], but stops at the first error for which
/// `should_retry` returns false. The last error is returned unchanged.
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    operation_name: &str,
    should_retry: P,
    mut operation: F,
) -> std::result::Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(e) => {
                if !should_retry(&e) {
                    debug!("{} failed with a non-retryable error: {}", operation_name, e);
                    return Err(e);
                }
                if attempt >= config.attempts {
                    warn!(
                        "{} failed after {} attempts: {}",
                        operation_name, config.attempts, e
                    );
                    return Err(e);
                }

                let delay = config.next_delay();
                warn!(
                    "{} failed (attempt {}/{}). Retrying in {:?}: {}",
                    operation_name, attempt, config.attempts, delay, e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Heuristic for errors coming back from RPC nodes and HTTP APIs that are
/// worth another attempt.
pub fn is_transient_error(error: &anyhow::Error) -> bool {
    let error_msg = format!("{:?}", error).to_lowercase();

    let transient_patterns = [
        "timeout",
        "timed out",
        "connection refused",
        "connection reset",
        "connection closed",
        "network error",
        "error sending request",
        "temporary failure",
        "service unavailable",
        "bad gateway",
        "rate limit",
        "too many requests",
        "nonce too low",
        "already known",
        "replacement transaction underpriced",
        "header not found",
    ];

    transient_patterns
        .iter()
        .any(|pattern| error_msg.contains(pattern))
}
