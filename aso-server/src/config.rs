//! Application configuration.
//!
//! Everything is loadable from environment variables with sane defaults, in
//! the same shape the API server config uses.

use std::time::Duration;

use playstore_client::fetcher::{FetcherConfig, Locale};
use playstore_client::retry::RetryPolicy;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8090,
            enable_cors: true,
        }
    }
}

/// Pipeline and store tuning knobs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api: ApiServerConfig,
    /// TTL for raw metadata snapshots and completed analysis payloads.
    pub cache_ttl: Duration,
    /// How long a completed job stays pollable.
    pub job_retention: Duration,
    /// Wall-clock deadline for one whole job.
    pub job_deadline: Duration,
    /// Timeout for one optional sub-task.
    pub subtask_timeout: Duration,
    /// Submissions admitted per client within the rate window.
    pub rate_max_requests: u32,
    /// Rate window length.
    pub rate_window: Duration,
    /// Fetcher retry/fallback configuration.
    pub fetcher: FetcherConfig,
    /// Chat-completions endpoint for the insight generator.
    pub insight_endpoint: String,
    /// API key for the insight generator, if required by the endpoint.
    pub insight_api_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiServerConfig::default(),
            cache_ttl: Duration::from_secs(24 * 3600),
            job_retention: Duration::from_secs(24 * 3600),
            job_deadline: Duration::from_secs(300),
            subtask_timeout: Duration::from_secs(120),
            rate_max_requests: 10,
            rate_window: Duration::from_secs(60),
            fetcher: FetcherConfig::default(),
            insight_endpoint: "https://api.deepseek.com/v1/chat/completions".to_string(),
            insight_api_key: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Supported env vars: `API_BIND_ADDRESS`, `API_PORT`, `CACHE_TTL_SECS`,
    /// `JOB_RETENTION_SECS`, `JOB_DEADLINE_SECS`, `SUBTASK_TIMEOUT_SECS`,
    /// `RATE_MAX_REQUESTS`, `RATE_WINDOW_SECS`, `FETCH_MAX_ATTEMPTS`,
    /// `FETCH_ATTEMPT_TIMEOUT_SECS`, `STORE_LOCALES` (comma-separated
    /// `lang-COUNTRY` pairs), `INSIGHT_ENDPOINT`, `INSIGHT_API_KEY`.
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(bind_address) = std::env::var("API_BIND_ADDRESS")
            && !bind_address.trim().is_empty()
        {
            config.api.bind_address = bind_address;
        }
        if let Some(port) = env_parse::<u16>("API_PORT") {
            config.api.port = port;
        }
        if let Some(secs) = env_parse::<u64>("CACHE_TTL_SECS") {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("JOB_RETENTION_SECS") {
            config.job_retention = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("JOB_DEADLINE_SECS") {
            config.job_deadline = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("SUBTASK_TIMEOUT_SECS") {
            config.subtask_timeout = Duration::from_secs(secs);
        }
        if let Some(max) = env_parse::<u32>("RATE_MAX_REQUESTS") {
            config.rate_max_requests = max;
        }
        if let Some(secs) = env_parse::<u64>("RATE_WINDOW_SECS") {
            config.rate_window = Duration::from_secs(secs);
        }
        if let Some(attempts) = env_parse::<u32>("FETCH_MAX_ATTEMPTS") {
            config.fetcher.retry = RetryPolicy {
                max_attempts: attempts.max(1),
                ..config.fetcher.retry
            };
        }
        if let Some(secs) = env_parse::<u64>("FETCH_ATTEMPT_TIMEOUT_SECS") {
            config.fetcher.attempt_timeout = Duration::from_secs(secs);
        }
        if let Ok(locales) = std::env::var("STORE_LOCALES") {
            let parsed = parse_locales(&locales);
            if !parsed.is_empty() {
                config.fetcher.locales = parsed;
            }
        }
        if let Ok(endpoint) = std::env::var("INSIGHT_ENDPOINT")
            && !endpoint.trim().is_empty()
        {
            config.insight_endpoint = endpoint;
        }
        config.insight_api_key = std::env::var("INSIGHT_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

fn parse_locales(raw: &str) -> Vec<Locale> {
    raw.split(',')
        .filter_map(|pair| {
            let (language, country) = pair.trim().split_once('-')?;
            if language.is_empty() || country.is_empty() {
                return None;
            }
            Some(Locale::new(language, country))
        })
        .collect()
}
