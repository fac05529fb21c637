//! energydash -- live energy-consumption dashboard.
//!
//! This crate loads time-stamped meter events from SQLite, derives
//! rate-of-change and inactivity signals, forecasts near-future consumption
//! with a cubic regression, buckets consumption per minute, and serves the
//! result as JSON for a browser UI.

pub mod api;
pub mod cache;
pub mod config;
pub mod pipeline;
pub mod refresh;
pub mod simulate;
pub mod storage;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::DashboardConfig;
use crate::pipeline::PipelineError;

/// Start the dashboard server: storage, background refresh, and HTTP API.
pub async fn serve(config: DashboardConfig) -> Result<()> {
    // 1. Initialize Storage (a failed open is retried on each pipeline run)
    tracing::info!(db_path = %config.storage.db_path.display(), "Initializing database");
    let source = storage::SqliteEventSource::deferred(config.storage.clone());
    if let Err(PipelineError::DataUnavailable { detail }) = source.connect().await {
        tracing::error!(%detail, "event store unavailable at startup, serving data_unavailable");
    }

    // 2. Shared state
    let state = api::state::AppState::new(Arc::new(source), config.defaults.clone());

    // 3. Start Refresh Loop (background task)
    if config.server.background_refresh {
        let refresh_state = state.clone();
        tokio::spawn(async move {
            refresh::run_refresh_loop(refresh_state).await;
        });
    }

    // 4. Start API Server
    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.server.bind))?;
    let app = api::router(state, Some(config.server.static_dir.as_path()));

    tracing::info!(%addr, "energydash listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
