use anyhow::Result;
use tracing_subscriber::EnvFilter;

use homebutler::config::Config;
use homebutler::scheduler::spawn_scheduler;
use homebutler::server::{router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("homebutler=info,tower_http=warn")),
        )
        .init();

    let config = Config::load()?;
    if !config.is_configured() {
        tracing::warn!("no API key configured; only fast-path commands will work");
    }

    let state = AppState::new(config.clone());
    spawn_scheduler(
        state.schedules.clone(),
        state.tools.clone(),
        state.notifier.clone(),
        config.server.tick_secs,
    );

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("homebutler listening on {addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down");
}
