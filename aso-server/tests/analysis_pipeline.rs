//! Integration tests for the analysis pipeline.
//!
//! These tests wire the real pipeline, job store, caches, and rate limiter
//! around scripted storefront and insight collaborators, then drive whole
//! jobs end to end through submit/poll.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use aso_server::Error;
use aso_server::api::AppState;
use aso_server::config::AppConfig;
use aso_server::insights::InsightGenerator;
use aso_server::jobs::{AnalyzeRequest, JobState, JobView};
use playstore_client::{AppMetadata, Locale, MetadataSource, SearchEntry, SourceError};

/// Storefront stub: a fixed set of known packages, everything else 404s.
struct ScriptedSource {
    apps: HashMap<String, AppMetadata>,
    calls: AtomicU32,
}

impl ScriptedSource {
    fn with_apps(packages: &[&str]) -> Self {
        let apps = packages
            .iter()
            .map(|package| (package.to_string(), metadata(package)))
            .collect();
        Self {
            apps,
            calls: AtomicU32::new(0),
        }
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSource for ScriptedSource {
    async fn app_metadata(
        &self,
        package: &str,
        _locale: &Locale,
    ) -> Result<AppMetadata, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.apps
            .get(package)
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                package: package.to_string(),
            })
    }

    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchEntry>, SourceError> {
        Ok(vec![])
    }

    async fn similar(&self, _package: &str, _limit: usize) -> Result<Vec<SearchEntry>, SourceError> {
        Ok(vec![])
    }
}

/// Insight stub with an optional artificial delay on market trends, used to
/// force the per-sub-task timeout path.
struct ScriptedInsights {
    trend_delay: Duration,
}

impl ScriptedInsights {
    fn instant() -> Self {
        Self {
            trend_delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl InsightGenerator for ScriptedInsights {
    async fn analyze_app(
        &self,
        app: &AppMetadata,
        _competitors: &[AppMetadata],
    ) -> aso_server::Result<serde_json::Value> {
        Ok(json!({ "summary": format!("analysis of {}", app.package_name) }))
    }

    async fn compare_competitors(
        &self,
        app: &AppMetadata,
        competitors: &[AppMetadata],
    ) -> aso_server::Result<serde_json::Value> {
        Ok(json!({
            "subject": app.package_name,
            "compared": competitors.len(),
        }))
    }

    async fn suggest_keywords(&self, keyword: &str) -> aso_server::Result<serde_json::Value> {
        Ok(json!({ "seed": keyword, "suggestions": [format!("{keyword} app")] }))
    }

    async fn market_trends(&self, category: &str) -> aso_server::Result<serde_json::Value> {
        if !self.trend_delay.is_zero() {
            tokio::time::sleep(self.trend_delay).await;
        }
        Ok(json!({ "category": category, "trend": "steady" }))
    }

    async fn optimize_description(
        &self,
        description: &str,
        keywords: &[String],
    ) -> aso_server::Result<serde_json::Value> {
        Ok(json!({
            "optimized": format!("{description} ({} keywords)", keywords.len()),
        }))
    }
}

fn metadata(package: &str) -> AppMetadata {
    AppMetadata {
        package_name: package.to_string(),
        title: format!("{package} title"),
        description: "A wholesale ordering app for retailers.".to_string(),
        category: "Business".to_string(),
        developer: "Example Dev".to_string(),
        rating: 4.2,
        reviews_count: 1200,
        installs: "10,000+".to_string(),
        locale: "en-US".to_string(),
    }
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    // One attempt per locale keeps failure paths fast.
    config.fetcher.retry.max_attempts = 1;
    config.rate_max_requests = 100;
    config
}

fn state_with(
    config: AppConfig,
    source: Arc<ScriptedSource>,
    insights: ScriptedInsights,
) -> AppState {
    AppState::with_collaborators(&config, source, Arc::new(insights))
}

fn request(subject: &str, competitors: &[&str], keywords: &[&str]) -> AnalyzeRequest {
    AnalyzeRequest {
        package_name: subject.to_string(),
        competitor_package_names: competitors.iter().map(|s| s.to_string()).collect(),
        keywords: keywords.iter().map(|s| s.to_string()).collect(),
    }
}

/// Poll until the job reaches a terminal state.
async fn wait_terminal(state: &AppState, job_id: &str) -> JobView {
    for _ in 0..500 {
        if let Some(view) = state.pipeline.poll(job_id)
            && view.status.is_terminal()
        {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not reach a terminal state");
}

mod full_runs {
    use super::*;

    #[tokio::test]
    async fn full_request_completes_with_every_subtask_recorded() {
        let source = Arc::new(ScriptedSource::with_apps(&[
            "com.example.app",
            "com.rival.one",
        ]));
        let state = state_with(test_config(), source, ScriptedInsights::instant());

        let record = state
            .pipeline
            .submit(
                request("com.example.app", &["com.rival.one"], &["wholesale"]),
                "client-a",
            )
            .await
            .unwrap();

        let view = wait_terminal(&state, &record.id).await;
        assert_eq!(view.status, JobState::Completed);
        assert_eq!(view.progress, 100);
        assert!(view.error.is_none());

        let data = view.data.unwrap();
        for key in [
            "app_metadata",
            "app_analysis",
            "market_trends",
            "competitor_analysis",
            "keyword_suggestions",
            "description_optimization",
        ] {
            assert!(data.get(key).is_some(), "missing payload key {key}");
        }
        assert_eq!(data["app_metadata"]["package_name"], "com.example.app");
        assert_eq!(data["competitor_analysis"]["comparison"]["compared"], 1);
    }

    #[tokio::test]
    async fn bare_request_skips_conditional_subtasks() {
        let source = Arc::new(ScriptedSource::with_apps(&["com.example.app"]));
        let state = state_with(test_config(), source, ScriptedInsights::instant());

        let record = state
            .pipeline
            .submit(request("com.example.app", &[], &[]), "client-a")
            .await
            .unwrap();

        let view = wait_terminal(&state, &record.id).await;
        assert_eq!(view.status, JobState::Completed);

        let data = view.data.unwrap();
        assert!(data.get("app_analysis").is_some());
        assert!(data.get("market_trends").is_some());
        assert!(data.get("competitor_analysis").is_none());
        assert!(data.get("keyword_suggestions").is_none());
        assert!(data.get("description_optimization").is_none());
    }
}

mod failure_handling {
    use super::*;

    #[tokio::test]
    async fn failed_competitor_is_dropped_and_reported() {
        // com.gone.app is not in the source and 404s in every locale.
        let source = Arc::new(ScriptedSource::with_apps(&[
            "com.example.app",
            "com.rival.one",
        ]));
        let state = state_with(test_config(), source, ScriptedInsights::instant());

        let record = state
            .pipeline
            .submit(
                request("com.example.app", &["com.gone.app", "com.rival.one"], &[]),
                "client-a",
            )
            .await
            .unwrap();

        let view = wait_terminal(&state, &record.id).await;
        assert_eq!(view.status, JobState::Completed, "job must survive a dropped competitor");

        let data = view.data.unwrap();
        let competitor = &data["competitor_analysis"];
        let survivors = competitor["competitors"].as_array().unwrap();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0]["package_name"], "com.rival.one");

        let errors = competitor["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].as_str().unwrap().contains("com.gone.app"));
    }

    #[tokio::test]
    async fn missing_subject_fails_the_job() {
        let source = Arc::new(ScriptedSource::with_apps(&[]));
        let state = state_with(test_config(), source, ScriptedInsights::instant());

        let record = state
            .pipeline
            .submit(request("com.missing.app", &[], &[]), "client-a")
            .await
            .unwrap();

        let view = wait_terminal(&state, &record.id).await;
        assert_eq!(view.status, JobState::Error);
        assert!(view.error.unwrap().contains("com.missing.app"));
        assert!(view.data.is_none(), "a failed primary fetch leaves no payload");
    }

    #[tokio::test]
    async fn subtask_timeout_is_recorded_but_job_completes() {
        let mut config = test_config();
        config.subtask_timeout = Duration::from_millis(50);

        let source = Arc::new(ScriptedSource::with_apps(&["com.example.app"]));
        let state = state_with(
            config,
            source,
            ScriptedInsights {
                trend_delay: Duration::from_secs(30),
            },
        );

        let record = state
            .pipeline
            .submit(request("com.example.app", &[], &[]), "client-a")
            .await
            .unwrap();

        let view = wait_terminal(&state, &record.id).await;
        assert_eq!(view.status, JobState::Completed);
        assert_eq!(view.progress, 100);

        let data = view.data.unwrap();
        assert_eq!(data["market_trends"]["kind"], "timeout");
        assert!(
            data["market_trends"]["error"]
                .as_str()
                .unwrap()
                .contains("market_trends")
        );
        // The other sub-task is unaffected.
        assert!(data["app_analysis"].get("kind").is_none());
    }

    #[tokio::test]
    async fn empty_package_name_is_rejected_up_front() {
        let source = Arc::new(ScriptedSource::with_apps(&[]));
        let state = state_with(test_config(), source, ScriptedInsights::instant());

        let err = state
            .pipeline
            .submit(request("   ", &[], &[]), "client-a")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(state.store.is_empty());
    }
}

mod caching {
    use super::*;

    #[tokio::test]
    async fn duplicate_submission_is_served_from_cache() {
        let source = Arc::new(ScriptedSource::with_apps(&["com.example.app"]));
        let state = state_with(
            test_config(),
            source.clone(),
            ScriptedInsights::instant(),
        );

        let first = state
            .pipeline
            .submit(request("com.example.app", &[], &["aso"]), "client-a")
            .await
            .unwrap();
        let first_view = wait_terminal(&state, &first.id).await;
        assert_eq!(first_view.status, JobState::Completed);

        let calls_after_first = source.call_count();

        // Same request from another client: a new job id, already COMPLETED,
        // and no further storefront traffic.
        let second = state
            .pipeline
            .submit(request("com.example.app", &[], &["aso"]), "client-b")
            .await
            .unwrap();
        assert_ne!(second.id, first.id);
        assert_eq!(second.state, JobState::Completed);
        assert_eq!(second.progress, 100);

        let second_view = state.pipeline.poll(&second.id).unwrap();
        assert_eq!(second_view.status, JobState::Completed);
        assert_eq!(second_view.data, first_view.data);
        assert_eq!(source.call_count(), calls_after_first);
    }

    #[tokio::test]
    async fn equivalent_request_orderings_share_the_cached_analysis() {
        let source = Arc::new(ScriptedSource::with_apps(&[
            "com.example.app",
            "com.rival.one",
            "com.rival.two",
        ]));
        let state = state_with(
            test_config(),
            source.clone(),
            ScriptedInsights::instant(),
        );

        let first = state
            .pipeline
            .submit(
                request("com.example.app", &["com.rival.one", "com.rival.two"], &[]),
                "client-a",
            )
            .await
            .unwrap();
        wait_terminal(&state, &first.id).await;
        let calls_after_first = source.call_count();

        // Reversed competitor order normalizes to the same fingerprint.
        let second = state
            .pipeline
            .submit(
                request("com.example.app", &["com.rival.two", "com.rival.one"], &[]),
                "client-b",
            )
            .await
            .unwrap();
        assert_eq!(second.state, JobState::Completed);
        assert_eq!(source.call_count(), calls_after_first);
    }
}

mod rate_limiting {
    use super::*;

    #[tokio::test]
    async fn over_limit_submission_is_rejected_without_a_job() {
        let mut config = test_config();
        config.rate_max_requests = 1;

        let source = Arc::new(ScriptedSource::with_apps(&["com.example.app"]));
        let state = state_with(config, source, ScriptedInsights::instant());

        state
            .pipeline
            .submit(request("com.example.app", &[], &[]), "client-a")
            .await
            .unwrap();
        assert_eq!(state.store.len(), 1);

        let err = state
            .pipeline
            .submit(request("com.other.app", &[], &[]), "client-a")
            .await
            .unwrap_err();
        match err {
            Error::RateLimited { retry_after } => assert!(retry_after > Duration::ZERO),
            other => panic!("expected RateLimited, got {other:?}"),
        }
        assert_eq!(state.store.len(), 1, "a rejected submission must not create a job");

        // A different client is unaffected.
        state
            .pipeline
            .submit(request("com.example.app", &[], &[]), "client-b")
            .await
            .unwrap();
    }
}

mod polling {
    use super::*;

    #[tokio::test]
    async fn unknown_job_id_polls_as_not_found() {
        let source = Arc::new(ScriptedSource::with_apps(&[]));
        let state = state_with(test_config(), source, ScriptedInsights::instant());
        assert!(state.pipeline.poll("no-such-job").is_none());
    }

    #[tokio::test]
    async fn deadline_overrun_times_out_on_poll() {
        let mut config = test_config();
        config.job_deadline = Duration::ZERO;
        config.subtask_timeout = Duration::from_millis(50);

        let source = Arc::new(ScriptedSource::with_apps(&["com.example.app"]));
        // Trends never finish inside the deadline.
        let state = state_with(
            config,
            source,
            ScriptedInsights {
                trend_delay: Duration::from_secs(30),
            },
        );

        let record = state
            .pipeline
            .submit(request("com.example.app", &[], &[]), "client-a")
            .await
            .unwrap();

        let view = wait_terminal(&state, &record.id).await;
        // Whichever side wins the race, the job ends terminal and pollable.
        assert!(matches!(view.status, JobState::Completed | JobState::Timeout));
    }
}
