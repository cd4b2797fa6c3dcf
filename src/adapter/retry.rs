//! Retry Policy and Error Classification
//!
//! リトライポリシーとエラー分類
//!
//! Every call site that needs retries goes through [`retry_with_backoff`];
//! nothing in this crate retries silently or unbounded.

use std::future::Future;
use std::time::Duration;

use log::warn;
use tokio::time::sleep;

use crate::error::{Result, TransferError};

// Retry configuration based on Google Cloud best practices
pub const MAX_ATTEMPTS: u32 = 5;
pub const INITIAL_RETRY_DELAY_MS: u64 = 1000;
pub const MAX_RETRY_DELAY_MS: u64 = 32000;

/// Bounded exponential-backoff retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(INITIAL_RETRY_DELAY_MS),
            max_delay: Duration::from_millis(MAX_RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Calculate the delay before the given retry with exponential backoff.
    /// `retry_count` is 1-based: the delay before the first retry is the
    /// initial delay.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = 1u64 << (retry_count.saturating_sub(1)).min(31);
        let delay = self.initial_delay.saturating_mul(factor as u32);
        delay.min(self.max_delay)
    }
}

/// Check if an error message indicates the connection itself is broken.
pub fn is_connection_error(error_msg: &str) -> bool {
    error_msg.contains("Broken pipe")
        || error_msg.contains("broken pipe")
        || error_msg.contains("Connection reset")
        || error_msg.contains("connection reset")
        || error_msg.contains("Connection refused")
        || error_msg.contains("connection refused")
        || error_msg.contains("connection error")
        || error_msg.contains("unexpected end of file")
}

/// Check if an error message indicates a transient remote condition.
pub fn is_transient_error(error_msg: &str) -> bool {
    error_msg.contains("503")
        || error_msg.contains("500")
        || error_msg.contains("429")
        || error_msg.contains("rate")
        || error_msg.contains("quota")
        || error_msg.contains("Quota")
        || error_msg.contains("timeout")
        || error_msg.contains("Timeout")
}

/// Default retry predicate: transport-level remote errors whose message
/// classifies as connection or transient trouble.
pub fn is_retryable(error: &TransferError) -> bool {
    if !error.is_remote() {
        return false;
    }
    let msg = error.to_string();
    is_connection_error(&msg) || is_transient_error(&msg)
}

/// Run `operation` until it succeeds, the error is not retryable, or the
/// policy's attempts are exhausted. The last error is returned unchanged.
pub async fn retry_with_backoff<T, F, Fut, P>(
    policy: RetryPolicy,
    retryable: P,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&TransferError) -> bool,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && retryable(&e) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "attempt {}/{} failed, retrying in {}ms: {}",
                    attempt,
                    policy.max_attempts,
                    delay.as_millis(),
                    e
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
