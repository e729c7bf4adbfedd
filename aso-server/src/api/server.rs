//! API server setup and configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use playstore_client::{AppMetadata, Fetcher, MetadataSource, PlayStoreSource, TtlCache};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::routes;
use crate::config::{ApiServerConfig, AppConfig};
use crate::error::{Error, Result};
use crate::insights::{DeepseekInsights, InsightGenerator};
use crate::jobs::JobStore;
use crate::pipeline::{AnalysisPipeline, PipelineConfig};
use crate::ratelimit::{RateLimiter, RateLimiterConfig};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    /// Analysis pipeline (submission gate + orchestration)
    pub pipeline: AnalysisPipeline,
    /// Job store, exposed for health counters
    pub store: Arc<JobStore>,
    /// Storefront source, used directly by the search/similar routes
    pub source: Arc<dyn MetadataSource>,
    /// Raw metadata cache, exposed for health counters
    pub metadata_cache: TtlCache<AppMetadata>,
    /// Completed analysis cache, exposed for health counters
    pub results_cache: TtlCache<Value>,
}

impl AppState {
    /// Wire up the full service graph from configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        let source: Arc<dyn MetadataSource> =
            Arc::new(PlayStoreSource::new(config.fetcher.attempt_timeout));
        let insights: Arc<dyn InsightGenerator> = Arc::new(DeepseekInsights::new(
            config.insight_endpoint.clone(),
            config.insight_api_key.clone().unwrap_or_default(),
        ));
        Self::with_collaborators(config, source, insights)
    }

    /// Wire up state around scripted collaborators (used by tests).
    pub fn with_collaborators(
        config: &AppConfig,
        source: Arc<dyn MetadataSource>,
        insights: Arc<dyn InsightGenerator>,
    ) -> Self {
        let metadata_cache = TtlCache::new(config.cache_ttl);
        let results_cache = TtlCache::new(config.cache_ttl);
        let store = Arc::new(JobStore::new(config.job_retention));
        let fetcher = Arc::new(Fetcher::new(
            source.clone(),
            metadata_cache.clone(),
            config.fetcher.clone(),
        ));
        let limiter = Arc::new(RateLimiter::new(RateLimiterConfig {
            max_requests: config.rate_max_requests,
            window: config.rate_window,
        }));
        let pipeline = AnalysisPipeline::new(
            store.clone(),
            fetcher,
            insights,
            results_cache.clone(),
            limiter,
            PipelineConfig {
                job_deadline: config.job_deadline,
                subtask_timeout: config.subtask_timeout,
            },
        );

        Self {
            start_time: Instant::now(),
            pipeline,
            store,
            source,
            metadata_cache,
            results_cache,
        }
    }
}

/// API server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    /// Create a new API server around existing state.
    pub fn new(config: ApiServerConfig, state: AppState) -> Self {
        Self {
            config,
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Build the router with all middleware and routes.
    fn build_router(&self) -> Router {
        let mut router = routes::create_router(self.state.clone());

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        router.layer(TraceLayer::new_for_http())
    }

    /// Start the server.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| Error::config(format!("Invalid address: {}", e)))?;

        let router = self.build_router();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::config(format!("Failed to bind {}: {}", addr, e)))?;

        tracing::info!("API server listening on http://{}", addr);

        let cancel_token = self.cancel_token.clone();

        // into_make_service_with_connect_info: the submit route uses the
        // peer address as its rate-limit identity.
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await
            .map_err(|e| Error::Other(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}
