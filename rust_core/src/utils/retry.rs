//! Bounded exponential backoff for provider calls.
//!
//! Only errors reporting [`MappingError::is_retryable`] are retried. A
//! `RateLimited` error carrying a provider hint waits for the hint instead of
//! the computed backoff.

use crate::error::{MappingError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Run `f` until it succeeds, fails with a non-retryable error, or attempts run out.
///
/// `label` only feeds the warning log.
pub async fn execute_with_retry<F, Fut, T>(label: &str, policy: RetryPolicy, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && e.is_retryable() => {
                let wait = e
                    .retry_after()
                    .map(|hint| hint.min(policy.max_backoff))
                    .unwrap_or_else(|| policy.backoff_for(attempt));
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {}ms",
                    label,
                    attempt,
                    max_attempts,
                    e,
                    wait.as_millis()
                );
                tokio::time::sleep(wait).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Treat an elapsed timeout as a retryable upstream failure.
pub async fn with_timeout<T, Fut>(
    provider: crate::types::Provider,
    timeout: Duration,
    fut: Fut,
) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(MappingError::unavailable(
            provider,
            format!("timed out after {}ms", timeout.as_millis()),
        )),
    }
}
