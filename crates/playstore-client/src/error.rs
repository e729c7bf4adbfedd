//! Error types for the retrieval layer.

use thiserror::Error;

/// Classification of a single upstream attempt.
///
/// `NotFound` is terminal for the locale it was observed in; `Transient`
/// covers anything worth retrying (connect errors, timeouts, 429, 5xx).
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("app not listed in this locale: {package}")]
    NotFound { package: String },

    #[error("transient upstream error: {reason}")]
    Transient { reason: String },

    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("upstream rejected the request: {status}")]
    Rejected { status: u16 },

    #[error("malformed upstream payload: {reason}")]
    Malformed { reason: String },
}

impl SourceError {
    /// Whether another attempt against the same locale makes sense.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }
}

/// Surface error of a fetch after retries and locale fallback are exhausted.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("app {package} not found in any locale ({locales})")]
    NotFoundAnywhere { package: String, locales: String },

    #[error("failed to fetch {package} after exhausting {attempts} attempts across {locales}: {last_error}")]
    Exhausted {
        package: String,
        attempts: u32,
        locales: String,
        last_error: String,
    },
}

impl FetchError {
    /// True when every locale reported the app as missing, as opposed to
    /// transient failures that merely outlasted the retry budget.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFoundAnywhere { .. })
    }
}
