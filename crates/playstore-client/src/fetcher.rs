//! Cache-first retrying fetcher with locale fallback.
//!
//! One [`Fetcher::fetch`] call walks the configured locale candidates in
//! priority order. A locale that reports the app missing is skipped without
//! further retries; transient failures retry the same locale under the
//! shared backoff policy. Every attempt runs under its own timeout, and only
//! successful snapshots are cached — failures never are.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use crate::error::{FetchError, SourceError};
use crate::retry::{RetryAction, RetryPolicy, retry_with_backoff};
use crate::source::MetadataSource;
use crate::types::AppMetadata;

/// One storefront locale candidate (`hl` / `gl` query parameters).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale {
    pub language: String,
    pub country: String,
}

impl Locale {
    pub fn new(language: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            country: country.into(),
        }
    }
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.language, self.country)
    }
}

/// Fetcher tuning knobs.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Locale candidates in priority order. Never empty.
    pub locales: Vec<Locale>,
    /// Backoff policy applied per locale.
    pub retry: RetryPolicy,
    /// Timeout for a single attempt, independent of the job deadline.
    pub attempt_timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            locales: vec![Locale::new("en", "US"), Locale::new("en", "GB")],
            retry: RetryPolicy::default(),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

/// Retrieves app metadata through the cache, retry, and fallback layers.
pub struct Fetcher {
    source: Arc<dyn MetadataSource>,
    cache: TtlCache<AppMetadata>,
    config: FetcherConfig,
}

impl Fetcher {
    pub fn new(
        source: Arc<dyn MetadataSource>,
        cache: TtlCache<AppMetadata>,
        config: FetcherConfig,
    ) -> Self {
        Self {
            source,
            cache,
            config,
        }
    }

    /// Fetch metadata for `package`, consulting the cache first.
    pub async fn fetch(&self, package: &str) -> Result<Arc<AppMetadata>, FetchError> {
        if let Some(cached) = self.cache.get(package) {
            debug!(package, "metadata cache hit");
            return Ok(cached);
        }

        let mut attempts_made = 0u32;
        let mut last_error: Option<SourceError> = None;
        let mut all_not_found = true;

        for locale in &self.config.locales {
            match self.fetch_in_locale(package, locale, &mut attempts_made).await {
                Ok(metadata) => {
                    info!(package, locale = %locale, "metadata fetched");
                    self.cache.insert(package, metadata.clone());
                    // The insert cloned the value in; read back the shared Arc.
                    return Ok(self
                        .cache
                        .get(package)
                        .unwrap_or_else(|| Arc::new(metadata)));
                }
                Err(err) => {
                    if !matches!(err, SourceError::NotFound { .. }) {
                        all_not_found = false;
                    }
                    warn!(package, locale = %locale, error = %err, "locale failed, falling through");
                    last_error = Some(err);
                }
            }
        }

        let locales = self
            .config
            .locales
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        if all_not_found {
            Err(FetchError::NotFoundAnywhere {
                package: package.to_string(),
                locales,
            })
        } else {
            Err(FetchError::Exhausted {
                package: package.to_string(),
                attempts: attempts_made,
                locales,
                last_error: last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no attempt made".to_string()),
            })
        }
    }

    async fn fetch_in_locale(
        &self,
        package: &str,
        locale: &Locale,
        attempts_made: &mut u32,
    ) -> Result<AppMetadata, SourceError> {
        let result = retry_with_backoff(&self.config.retry, |_attempt| async move {
            let attempt_future = self.source.app_metadata(package, locale);
            let outcome = match tokio::time::timeout(self.config.attempt_timeout, attempt_future)
                .await
            {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout {
                    timeout_secs: self.config.attempt_timeout.as_secs(),
                }),
            };

            match outcome {
                Ok(metadata) => RetryAction::Success(metadata),
                // Missing in this locale: move straight to the next candidate.
                Err(err @ SourceError::NotFound { .. }) => RetryAction::Fail(err),
                Err(err) if err.is_retryable() => RetryAction::Retry(err),
                Err(err) => RetryAction::Fail(err),
            }
        })
        .await;

        // Attempt accounting is approximate for NotFound short-circuits, which
        // is fine: it only feeds the error message.
        *attempts_made += match &result {
            Ok(_) => 1,
            Err(SourceError::NotFound { .. }) => 1,
            Err(_) => self.config.retry.max_attempts,
        };

        result
    }

    pub fn cache(&self) -> &TtlCache<AppMetadata> {
        &self.cache
    }
}
