//! relipredict -- software reliability prediction engine.
//!
//! This crate cleans time-between-failures data, tests it for reliability
//! trends, fits software reliability growth models on a train/test split and
//! assembles scored analysis reports, optionally with a generated narrative.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod narrative;
pub mod preprocess;
pub mod report;
pub mod series;
pub mod stats;
pub mod trend;

use anyhow::{Context, Result};

use crate::api::state::AppState;
use crate::config::Config;

/// Start the HTTP service on `bind`.
pub async fn serve(config: &Config, bind: &str) -> Result<()> {
    let state = AppState::from_config(config);
    let app = api::router(state);

    let addr: std::net::SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", bind))?;
    tracing::info!(%addr, "relipredict listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
