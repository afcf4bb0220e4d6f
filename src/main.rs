use buildtrack_api::app::{self, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, SEED_FILE, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Initialize configuration (this loads the config singleton)
    let config = buildtrack_api::config::config();
    tracing::info!(
        "Starting BuildTrack API in {:?} mode with {:?} storage",
        config.environment,
        config.database.backend
    );

    let state = AppState::from_config(config).await?;
    let app = app::router(state, config);

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", bind_addr, e))?;

    tracing::info!("BuildTrack API listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
