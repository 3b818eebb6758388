//! bits-ledger server entry point.
//!
//! Connects to PostgreSQL, runs migrations, starts the expiration sweeper
//! and serves the REST API until SIGINT or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use tokio::signal;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use bits_ledger::api;
use bits_ledger::app_state::AppState;
use bits_ledger::config::{AppConfig, LogFormat};
use bits_ledger::domain::{EventBus, SystemClock};
use bits_ledger::persistence::PostgresStore;
use bits_ledger::service::{ExpirationSweeper, Ledger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = AppConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting bits-ledger");

    // Build persistence layer
    let store = PostgresStore::connect(
        &config.database_url,
        config.database_max_connections,
        config.database_min_connections,
        Duration::from_secs(config.database_connect_timeout_secs),
    )
    .await
    .context("connecting to the database")?;
    store.migrate().await.context("running migrations")?;

    // Build service layer
    let event_bus = EventBus::new(config.event_bus_capacity);
    let ledger = Ledger::new(store, event_bus, config.engine.clone(), Arc::new(SystemClock));

    // Background expiration sweep
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirationSweeper::new(
        ledger.clone(),
        Duration::from_secs(config.sweep_interval_secs),
    );
    let sweeper_task = tokio::spawn(sweeper.run(shutdown_rx));

    // Build router
    let app = Router::new()
        .merge(api::build_router::<PostgresStore>())
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState::new(ledger));

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_tx.send(true).ok();
    if let Err(e) = sweeper_task.await {
        tracing::warn!(error = %e, "expiration sweeper task failed");
    }
    tracing::info!("bits-ledger stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
