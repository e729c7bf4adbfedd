//! Per-client submission rate limiting.
//!
//! Sliding-window limiter: at most `max_requests` admissions per client in
//! any trailing `window`. Stale timestamps are pruned lazily on access, and
//! a denial reports how long until the oldest retained admission leaves the
//! window.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::{Error, Result};

/// Configuration for the rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Admissions allowed per window.
    pub max_requests: u32,
    /// Trailing window length.
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
        }
    }
}

/// Sliding-window rate limiter keyed by client identity.
///
/// # Cancel Safety
///
/// The mutex is only held for the synchronous prune-and-append, with no
/// await points while holding the lock.
pub struct RateLimiter {
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Admit or reject one request from `client_id`.
    ///
    /// On admission the request's timestamp is recorded. On rejection
    /// nothing is recorded and the error carries a retry-after hint.
    pub async fn check(&self, client_id: &str) -> Result<()> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let window = windows.entry(client_id.to_string()).or_default();

        // Lazy prune: everything older than the trailing window.
        while let Some(oldest) = window.front() {
            if now.duration_since(*oldest) >= self.config.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if (window.len() as u32) < self.config.max_requests {
            window.push_back(now);
            return Ok(());
        }

        // Full window: the oldest retained timestamp decides the wait.
        let retry_after = window
            .front()
            .map(|oldest| self.config.window - now.duration_since(*oldest))
            .unwrap_or(self.config.window);
        trace!(client_id, retry_after_secs = retry_after.as_secs(), "rate limited");
        Err(Error::RateLimited { retry_after })
    }

    /// Number of clients with a live window (health/introspection).
    pub async fn tracked_clients(&self) -> usize {
        self.windows.lock().await.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}
