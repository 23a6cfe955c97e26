//! Read-only HTTP views of client state.
//!
//! Serves JSON projections (session leaderboards with countdowns, live
//! auction bid boards, notifications) for presentational consumers.
//! CORS enabled for local development.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::expiry::ExpiryThresholds;
use crate::state::StateHandle;
use routes::{SharedViewState, ViewState};

/// Bind the port and serve in a background task.
pub async fn spawn_views(
    state: StateHandle,
    thresholds: ExpiryThresholds,
    port: u16,
) -> Result<JoinHandle<()>> {
    let app = build_router(Arc::new(ViewState::new(state, thresholds)));

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind views port {port}"))?;
    info!(port, "Views server listening on http://localhost:{port}");

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Views server error");
        }
    }))
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: SharedViewState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/status", get(routes::get_status))
        .route("/api/sessions", get(routes::get_sessions))
        .route("/api/sessions/:id/leaderboard", get(routes::get_leaderboard))
        .route("/api/auctions", get(routes::get_auctions))
        .route("/api/auctions/:id/bids", get(routes::get_bids))
        .route("/api/search", get(routes::get_search))
        .route("/api/appointments", get(routes::get_appointments))
        .route("/api/notifications", get(routes::get_notifications))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
