//! Analysis pipeline: submission gate plus background orchestration.
//!
//! `submit` is the only entry point that creates jobs. It applies the
//! rate-limit gate, checks the completed-analysis cache, and for a miss
//! spawns one background orchestration run. The run fetches the subject's
//! metadata first (mandatory, fatal on failure), then fans the applicable
//! optional sub-tasks out concurrently and settles them one by one into the
//! job record.

use std::sync::Arc;
use std::time::Duration;

use playstore_client::{AppMetadata, Fetcher, TtlCache};
use serde_json::{Value, json};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::insights::InsightGenerator;
use crate::jobs::{
    AnalyzeRequest, JobRecord, JobState, JobStore, JobView, PRIMARY_FETCH_PROGRESS, SubTask,
};
use crate::ratelimit::RateLimiter;
use crate::{Error, Result};

/// Payload key for the raw subject metadata recorded by the primary fetch.
pub const APP_METADATA_KEY: &str = "app_metadata";

/// Orchestration timing knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Wall-clock limit for one whole job run.
    pub job_deadline: Duration,
    /// Limit for each optional sub-task.
    pub subtask_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            job_deadline: Duration::from_secs(300),
            subtask_timeout: Duration::from_secs(120),
        }
    }
}

/// Composition root for the analysis flow. Cheap to clone; all state is
/// behind shared handles.
#[derive(Clone)]
pub struct AnalysisPipeline {
    store: Arc<JobStore>,
    fetcher: Arc<Fetcher>,
    insights: Arc<dyn InsightGenerator>,
    results: TtlCache<Value>,
    limiter: Arc<RateLimiter>,
    config: PipelineConfig,
}

impl AnalysisPipeline {
    pub fn new(
        store: Arc<JobStore>,
        fetcher: Arc<Fetcher>,
        insights: Arc<dyn InsightGenerator>,
        results: TtlCache<Value>,
        limiter: Arc<RateLimiter>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            insights,
            results,
            limiter,
            config,
        }
    }

    /// Submit one analysis request on behalf of `client_id`.
    ///
    /// Rate-limited submissions are rejected before any job exists. A
    /// fingerprint-cache hit returns a job that is COMPLETED from the
    /// start; otherwise a PENDING job is created, moved to PROCESSING, and
    /// its orchestration spawned in the background.
    pub async fn submit(&self, request: AnalyzeRequest, client_id: &str) -> Result<JobRecord> {
        let request = request.normalized();
        if request.package_name.is_empty() {
            return Err(Error::validation("package_name must not be empty"));
        }

        self.limiter.check(client_id).await?;

        let fingerprint = request.fingerprint();
        if let Some(cached) = self.results.get(&fingerprint) {
            info!(package = %request.package_name, "analysis served from cache");
            return Ok(self.store.create_completed(request, (*cached).clone()));
        }

        let mut record = self.store.create(request.clone(), self.config.job_deadline);
        // Claim the job before spawning so a duplicate spawn is impossible.
        self.store.begin_processing(&record.id)?;
        record.state = JobState::Processing;
        record.progress = record.progress.max(10);

        let pipeline = self.clone();
        let job_id = record.id.clone();
        tokio::spawn(async move {
            pipeline.run(job_id, request, fingerprint).await;
        });

        Ok(record)
    }

    /// Poll a job by id. Lazy deadline and retention transitions apply.
    pub fn poll(&self, job_id: &str) -> Option<JobView> {
        self.store.get(job_id)
    }

    /// One orchestration run. Never returns an error: every failure mode
    /// lands in the job record instead.
    async fn run(&self, job_id: String, request: AnalyzeRequest, fingerprint: String) {
        let app = match self.fetcher.fetch(&request.package_name).await {
            Ok(app) => app,
            Err(err) => {
                error!(job_id = %job_id, package = %request.package_name, error = %err, "primary fetch failed");
                self.store.fail(
                    &job_id,
                    format!("failed to fetch metadata for {}: {err}", request.package_name),
                );
                return;
            }
        };

        match serde_json::to_value(&*app) {
            Ok(value) => self.store.record_primary(&job_id, APP_METADATA_KEY, value),
            Err(err) => {
                // Metadata that cannot serialize would poison the payload.
                self.store
                    .fail(&job_id, format!("metadata serialization failed: {err}"));
                return;
            }
        }

        let tasks = applicable_subtasks(&request, &app);
        let total = tasks.len() as u32;
        debug!(job_id = %job_id, total, "fanning out sub-tasks");

        let mut set: JoinSet<(SubTask, Value)> = JoinSet::new();
        for task in tasks {
            let pipeline = self.clone();
            let request = request.clone();
            let app = app.clone();
            let timeout = self.config.subtask_timeout;
            set.spawn(async move {
                let outcome =
                    tokio::time::timeout(timeout, pipeline.run_subtask(task, &request, &app)).await;
                let value = match outcome {
                    Ok(Ok(value)) => value,
                    Ok(Err(err)) => {
                        warn!(sub_task = %task, error = %err, "sub-task failed");
                        json!({ "error": err.to_string(), "kind": "failed" })
                    }
                    Err(_) => {
                        warn!(sub_task = %task, timeout_secs = timeout.as_secs(), "sub-task timed out");
                        json!({
                            "error": format!("{task} timed out after {}s", timeout.as_secs()),
                            "kind": "timeout",
                        })
                    }
                };
                (task, value)
            });
        }

        let mut done = 0u32;
        while let Some(joined) = set.join_next().await {
            done += 1;
            let progress =
                PRIMARY_FETCH_PROGRESS + (done * 60 / total.max(1)) as u8;
            match joined {
                Ok((task, value)) => {
                    self.store.record_subtask(&job_id, task.key(), value, progress);
                }
                Err(err) => {
                    // A panicked sub-task still settles the job.
                    error!(job_id = %job_id, error = %err, "sub-task join failed");
                }
            }
        }

        self.store.complete(&job_id);

        // Only a run that actually completed feeds the fingerprint cache;
        // a lazily timed-out job must not produce a cached analysis.
        if let Some(view) = self.store.get(&job_id) {
            if view.status == JobState::Completed {
                if let Some(data) = view.data {
                    self.results.insert(&fingerprint, data);
                }
            }
        }
        info!(job_id = %job_id, "orchestration finished");
    }

    async fn run_subtask(
        &self,
        task: SubTask,
        request: &AnalyzeRequest,
        app: &AppMetadata,
    ) -> Result<Value> {
        match task {
            SubTask::AppAnalysis => self.insights.analyze_app(app, &[]).await,
            SubTask::CompetitorAnalysis => self.competitor_analysis(request, app).await,
            SubTask::KeywordSuggestions => {
                let mut suggestions = serde_json::Map::new();
                for keyword in &request.keywords {
                    let value = self.insights.suggest_keywords(keyword).await?;
                    suggestions.insert(keyword.clone(), value);
                }
                Ok(Value::Object(suggestions))
            }
            SubTask::MarketTrends => {
                let category = if app.category.is_empty() {
                    "mobile"
                } else {
                    &app.category
                };
                self.insights.market_trends(category).await
            }
            SubTask::DescriptionOptimization => {
                self.insights
                    .optimize_description(&app.description, &request.keywords)
                    .await
            }
        }
    }

    /// Fetch every competitor, dropping the ones that fail, and compare the
    /// subject against the survivors. Individual failures are reported in
    /// the payload's `errors` list; the sub-task itself still succeeds.
    async fn competitor_analysis(
        &self,
        request: &AnalyzeRequest,
        app: &AppMetadata,
    ) -> Result<Value> {
        let outcomes = futures::future::join_all(
            request
                .competitor_package_names
                .iter()
                .map(|package| async move { (package, self.fetcher.fetch(package).await) }),
        )
        .await;

        let mut competitors: Vec<AppMetadata> = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        for (package, outcome) in outcomes {
            match outcome {
                Ok(metadata) => competitors.push((*metadata).clone()),
                Err(err) => {
                    warn!(package = %package, error = %err, "competitor dropped");
                    errors.push(format!("{package}: {err}"));
                }
            }
        }

        let comparison = self.insights.compare_competitors(app, &competitors).await?;
        Ok(json!({
            "competitors": competitors,
            "comparison": comparison,
            "errors": errors,
        }))
    }
}

/// Decide which optional sub-tasks apply to this request.
///
/// App analysis and market trends always run. Competitor analysis needs at
/// least one competitor id. Keyword suggestions need keywords; description
/// optimization additionally needs a description to rewrite.
fn applicable_subtasks(request: &AnalyzeRequest, app: &AppMetadata) -> Vec<SubTask> {
    let mut tasks = vec![SubTask::AppAnalysis, SubTask::MarketTrends];
    if !request.competitor_package_names.is_empty() {
        tasks.push(SubTask::CompetitorAnalysis);
    }
    if !request.keywords.is_empty() {
        tasks.push(SubTask::KeywordSuggestions);
        if !app.description.is_empty() {
            tasks.push(SubTask::DescriptionOptimization);
        }
    }
    tasks
}
