use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use mailcraft_api::app::{create_app, AppState};
use mailcraft_api::config::Config;
use mailcraft_api::jobs::{CacheSweepJob, JobScheduler};
use mailcraft_api::middleware::{init_logging, init_metrics};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    init_logging(&config.logging)?;
    init_metrics()?;

    info!("Starting Mailcraft API v{}", env!("CARGO_PKG_VERSION"));

    let state = AppState::from_config(config.clone())?;
    info!(
        backend = state.service.compiler_backend(),
        max_concurrent = config.generation.max_concurrent_generations,
        "Generation service ready"
    );

    let mut scheduler = JobScheduler::new();
    if config.cache.enabled {
        scheduler.register(CacheSweepJob::new(
            state.service.controller().clone(),
            config.cache.sweep_interval_minutes,
        ));
    }
    scheduler.start();

    let app = create_app(state);

    let addr = config.socket_addr()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(10)).await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
