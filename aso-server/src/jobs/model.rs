//! Job data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Progress pinned once the mandatory primary fetch lands; the optional
/// sub-tasks share the remaining range.
pub const PRIMARY_FETCH_PROGRESS: u8 = 40;

/// Job status values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Created, background work not started yet.
    Pending,
    /// Orchestration is running.
    Processing,
    /// Finished; optional sub-tasks may still carry per-task errors.
    Completed,
    /// The mandatory primary fetch failed.
    Error,
    /// The wall-clock deadline passed while still processing.
    Timeout,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
            Self::Timeout => "TIMEOUT",
        }
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Timeout)
    }
}

/// One analysis request as submitted by a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyzeRequest {
    pub package_name: String,
    #[serde(default)]
    pub competitor_package_names: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl AnalyzeRequest {
    /// Trim, drop empties, sort and dedupe the list-valued parameters so
    /// equivalent requests produce equal fingerprints.
    pub fn normalized(&self) -> Self {
        let clean = |items: &[String]| {
            let mut cleaned: Vec<String> = items
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            cleaned.sort();
            cleaned.dedup();
            cleaned
        };

        Self {
            package_name: self.package_name.trim().to_string(),
            competitor_package_names: clean(&self.competitor_package_names),
            keywords: clean(&self.keywords),
        }
    }

    /// Cache key for the completed-analysis namespace.
    pub fn fingerprint(&self) -> String {
        let normalized = self.normalized();
        let mut hasher = Sha256::new();
        hasher.update(normalized.package_name.as_bytes());
        for competitor in &normalized.competitor_package_names {
            hasher.update(b"|c:");
            hasher.update(competitor.as_bytes());
        }
        for keyword in &normalized.keywords {
            hasher.update(b"|k:");
            hasher.update(keyword.as_bytes());
        }
        format!("analysis:{}", hex::encode(hasher.finalize()))
    }
}

/// Named sub-tasks of one analysis run.
///
/// The primary metadata fetch is not listed here: it is mandatory,
/// sequenced before the fan-out, and fatal on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubTask {
    AppAnalysis,
    CompetitorAnalysis,
    KeywordSuggestions,
    MarketTrends,
    DescriptionOptimization,
}

impl SubTask {
    /// Key under which the sub-task's result-or-error lands in the payload.
    pub fn key(&self) -> &'static str {
        match self {
            Self::AppAnalysis => "app_analysis",
            Self::CompetitorAnalysis => "competitor_analysis",
            Self::KeywordSuggestions => "keyword_suggestions",
            Self::MarketTrends => "market_trends",
            Self::DescriptionOptimization => "description_optimization",
        }
    }
}

impl std::fmt::Display for SubTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Stored job record. Mutated only through [`super::JobStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub state: JobState,
    pub progress: u8,
    pub request: AnalyzeRequest,
    /// Sub-task name -> result-or-error payload.
    pub data: Map<String, Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(request: AnalyzeRequest, deadline: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            state: JobState::Pending,
            progress: 0,
            request,
            data: Map::new(),
            error: None,
            created_at: now,
            updated_at: now,
            deadline_at: now + deadline,
        }
    }
}

/// Client-facing view of a job, as returned by the poll endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: String,
    pub status: JobState,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&JobRecord> for JobView {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.id.clone(),
            status: record.state,
            progress: record.progress,
            data: if record.data.is_empty() {
                None
            } else {
                Some(Value::Object(record.data.clone()))
            },
            error: record.error.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}
