//! Retry-with-backoff utility shared by the fetcher.
//!
//! Exponential backoff with an optional jitter component and a hard delay
//! cap, with error classification left to the caller.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts per target (initial attempt included).
    pub max_attempts: u32,
    /// Base delay before the second attempt. Subsequent delays grow
    /// exponentially: `base * multiplier^(attempt-1)`.
    pub base_delay: Duration,
    /// Hard cap on the computed delay.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub multiplier: f64,
    /// When true, adds up to 25% random jitter so concurrent retries against
    /// the same upstream do not align.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // 1s, 2s, capped — the cadence the storefront tolerates.
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Compute the delay that precedes `attempt` (1-indexed; attempt 0 is
    /// the initial call and never waits).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.base_delay.as_millis() as f64
            * self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped_ms = base.min(self.max_delay.as_millis() as f64) as u64;

        if !self.jitter {
            return Duration::from_millis(capped_ms);
        }

        let jitter_ms = (capped_ms as f64 * 0.25 * rand::random::<f64>()) as u64;
        Duration::from_millis(capped_ms + jitter_ms).min(self.max_delay)
    }
}

/// Result of a single attempt, used by the caller to signal retryability.
pub enum RetryAction<T, E> {
    /// Operation succeeded.
    Success(T),
    /// Operation failed with a retryable error.
    Retry(E),
    /// Operation failed permanently; give up on this target immediately.
    Fail(E),
}

/// Execute an async operation with retry-and-backoff.
///
/// The `operation` closure receives the current attempt number (0-indexed)
/// and classifies its own outcome via [`RetryAction`].
pub async fn retry_with_backoff<F, Fut, T, E>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = RetryAction<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            RetryAction::Success(value) => return Ok(value),
            RetryAction::Fail(err) => return Err(err),
            RetryAction::Retry(err) => {
                attempt += 1;
                if attempt >= attempts {
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    attempt,
                    max = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient error"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
