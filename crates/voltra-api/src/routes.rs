//! Route definitions for the telemetry read API.

use crate::handlers;
use crate::AppState;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

/// API routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/data", get(handlers::data))
        .route("/api/historical", get(handlers::historical))
}

/// Build the full router with shared state attached.
pub fn router(state: Arc<AppState>) -> Router {
    api_routes().with_state(state)
}
