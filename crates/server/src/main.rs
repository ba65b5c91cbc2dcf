mod api;
mod bootstrap;
mod health;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use haggle_core::config::{AppConfig, LoadOptions, ServerConfig};
use haggle_core::SessionStore;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use haggle_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let state = api::AppState {
        orchestrator: app.orchestrator.clone(),
        gateway: app.gateway.clone(),
        call_records: app.call_records.clone(),
        db_pool: app.db_pool.clone(),
    };
    let router = api::router(state.clone()).merge(health::router(state));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_idle_sweeper(app.orchestrator.store().clone(), &app.config.server, shutdown_rx.clone());

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "haggle-server listening"
    );

    let mut server_shutdown = shutdown_rx;
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stopping| *stopping).await;
            })
            .await
    });

    tokio::signal::ctrl_c().await?;
    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "haggle-server stopping"
    );
    let _ = shutdown_tx.send(true);

    // Open event streams never finish on their own, so the drain is bounded.
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined??,
        Err(_) => warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "connections still open after the grace period; exiting"
        ),
    }

    if let Some(pool) = &app.db_pool {
        pool.close().await;
    }
    Ok(())
}

fn spawn_idle_sweeper(
    store: Arc<SessionStore>,
    config: &ServerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    if config.session_idle_timeout_secs == 0 {
        return;
    }
    let max_idle = Duration::from_secs(config.session_idle_timeout_secs);
    let period = Duration::from_secs(config.session_sweep_interval_secs.max(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = store.evict_idle(max_idle).await;
                    if !evicted.is_empty() {
                        info!(
                            event_name = "session.sweep.evicted",
                            count = evicted.len(),
                            "idle sessions evicted"
                        );
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    });
}
