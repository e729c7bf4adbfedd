//! Generative analysis collaborators.
//!
//! The pipeline never talks to a language-model API directly; it goes
//! through [`InsightGenerator`] so tests can script responses and the
//! backing vendor can change without touching orchestration.

mod deepseek;

pub use deepseek::DeepseekInsights;

use async_trait::async_trait;
use playstore_client::AppMetadata;
use serde_json::Value;

use crate::Result;

/// Produces the analytical payloads for each optional sub-task.
///
/// Every method returns an opaque JSON value; the pipeline stores it
/// verbatim under the sub-task's payload key without interpreting it.
#[async_trait]
pub trait InsightGenerator: Send + Sync {
    /// Full metadata analysis of the subject app against its competitors.
    async fn analyze_app(
        &self,
        app: &AppMetadata,
        competitors: &[AppMetadata],
    ) -> Result<Value>;

    /// Comparative positioning across the fetched competitor set.
    async fn compare_competitors(
        &self,
        app: &AppMetadata,
        competitors: &[AppMetadata],
    ) -> Result<Value>;

    /// Suggestions derived from a single seed keyword.
    async fn suggest_keywords(&self, keyword: &str) -> Result<Value>;

    /// Category-level market trend overview.
    async fn market_trends(&self, category: &str) -> Result<Value>;

    /// Rewrite of the store description targeting the given keywords.
    async fn optimize_description(
        &self,
        description: &str,
        keywords: &[String],
    ) -> Result<Value>;
}
