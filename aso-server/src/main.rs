use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aso_server::api::{ApiServer, AppState};
use aso_server::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aso_server=debug,playstore_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env_or_default();
    if config.insight_api_key.is_none() {
        tracing::warn!("INSIGHT_API_KEY not set, insight sub-tasks will fail against live backends");
    }

    let state = AppState::from_config(&config);
    let server = ApiServer::new(config.api.clone(), state);

    tracing::info!("aso-server initialized successfully");
    server.run().await?;

    Ok(())
}
