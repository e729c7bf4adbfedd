//! Play Store retrieval layer.
//!
//! Provides the pieces the analysis pipeline needs to talk to the storefront:
//! a [`MetadataSource`] trait with a reqwest-backed implementation, a
//! cache-first retrying [`Fetcher`] with locale fallback, a generic
//! [`TtlCache`], and the shared retry-with-backoff utility.

pub mod cache;
pub mod error;
pub mod fetcher;
pub mod retry;
pub mod source;
pub mod types;

pub use cache::{CacheStats, TtlCache};
pub use error::{FetchError, SourceError};
pub use fetcher::{Fetcher, FetcherConfig, Locale};
pub use retry::{RetryAction, RetryPolicy, retry_with_backoff};
pub use source::{MetadataSource, PlayStoreSource};
pub use types::{AppMetadata, SearchEntry};
