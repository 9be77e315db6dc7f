//! HTTP API over the learning coordinator.
//!
//! Routes are nested under `/agents/{agent_id}/learning`. Authentication is
//! external: mutating requests name their `caller` account in the body, and
//! the coordinator decides whether that account may act on the agent.

mod learning;
mod state;

pub use state::ApiState;

use crate::config::ApiConfig;

use anyhow::Context as _;
use axum::Router;
use axum::routing::{get, post};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

/// Build the router with all learning endpoints.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/agents/{agent_id}/learning", get(learning::get_learning))
        .route(
            "/agents/{agent_id}/learning/metrics",
            get(learning::get_metrics),
        )
        .route(
            "/agents/{agent_id}/learning/history",
            get(learning::get_history),
        )
        .route("/agents/{agent_id}/learning/verify", post(learning::verify))
        .route("/agents/{agent_id}/learning/enable", post(learning::enable))
        .route("/agents/{agent_id}/learning/disable", post(learning::disable))
        .route(
            "/agents/{agent_id}/learning/interactions",
            post(learning::record_interaction),
        )
        .route(
            "/agents/{agent_id}/learning/updates",
            post(learning::update_learning),
        )
        .with_state(state)
}

/// Serve the API until `shutdown` resolves.
pub async fn serve(
    config: &ApiConfig,
    state: Arc<ApiState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = SocketAddr::new(config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind API listener on {addr}"))?;
    tracing::info!(%addr, "learning API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("learning API server failed")?;

    tracing::info!("learning API stopped");
    Ok(())
}
