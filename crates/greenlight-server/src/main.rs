mod config;

use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use greenlight_api::{AppState, AppStateInner, reminders};
use greenlight_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "greenlight=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    let addr = config.addr()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    // Shared state
    let mut inner = AppStateInner::new(db, config.jwt_secret.clone());
    inner.token_ttl_days = config.token_ttl_days;
    inner.service_token = config.service_token.clone();
    if let Some(interval) = config.reminder_interval {
        inner.sweep_window = interval;
    }
    let state: AppState = Arc::new(inner);

    if config.service_token.is_none() {
        warn!("GREENLIGHT_SERVICE_TOKEN unset; cron and admin routes are open");
    }

    let sweeper = config
        .reminder_interval
        .map(|every| tokio::spawn(sweep_loop(state.clone(), every)));

    let app = greenlight_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Greenlight server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    info!("Greenlight server stopped");
    Ok(())
}

/// Runs the reminder sweep every `every`. The first tick fires immediately.
async fn sweep_loop(state: AppState, every: Duration) {
    info!("Reminder sweep every {}s", every.as_secs());
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(e) = reminders::run_sweep(&state).await {
            warn!("Reminder sweep failed: {:#}", e);
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
