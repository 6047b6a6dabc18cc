use std::sync::Arc;

use anyhow::Result;
use persistence::{
    FileBaseConfigSource, InMemoryOverrideBackend, OverrideBackend, RedisOverrideBackend,
};
use pos_rules_api::{app, config, middleware};
use shared::clock::system_clock;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Load configuration
    let config = config::Config::load()?;

    // Initialize logging
    middleware::logging::init_logging(&config.logging)?;

    info!("Starting POS rules engine v{}", env!("CARGO_PKG_VERSION"));

    let metrics = middleware::init_metrics()?;

    // Override backend; without Redis, overrides only live for this process
    let backend: Arc<dyn OverrideBackend> = if config.redis.enabled {
        info!(url = %config.redis.url, "Connecting to Redis override backend");
        Arc::new(RedisOverrideBackend::connect(&config.redis.url).await?)
    } else {
        warn!("Redis disabled, runtime overrides are kept in memory");
        Arc::new(InMemoryOverrideBackend::new())
    };

    let base_source = Arc::new(
        FileBaseConfigSource::new(
            &config.pricing.base_config_path,
            &config.feature_flags.defaults_path,
        )
        .with_environment_overrides(config.feature_flags.environment_overrides.clone()),
    );

    let addr = config.socket_addr()?;

    // Build application
    let state = app::AppState::new(config, backend, base_source, system_clock())
        .with_metrics(metrics);
    let app = app::create_app(state);

    // Start server
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
