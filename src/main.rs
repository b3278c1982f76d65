use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blinddate::{config::Config, router, services::scheduler, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config)
        .await
        .context("Failed to initialize application state")?;
    tracing::info!("✅ AppState initialized");

    let restored = state
        .blind_date
        .restore()
        .await
        .context("Failed to restore live sessions")?;
    tracing::info!("✅ {} live sessions resumed", restored);

    let shutdown = CancellationToken::new();
    let driver = tokio::spawn(scheduler::drive(
        state.blind_date.clone(),
        Duration::from_millis(config.scheduler_tick_ms.max(1)),
        shutdown.clone(),
    ));
    tracing::info!("✅ Deadline driver started (every {}ms)", config.scheduler_tick_ms);

    let app = router::build(state);

    tracing::info!("🚀 Server listening on http://{}", config.bind_addr);
    tracing::info!("✅ All systems operational");

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("🛑 Shutdown requested");
            server_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = driver.await {
        tracing::error!("❌ Deadline driver panicked: {}", e);
    }

    Ok(())
}
