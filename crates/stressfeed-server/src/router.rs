//! Axum router construction.
//!
//! Assembles every route into a single [`Router`] with CORS enabled for
//! cross-origin dashboard access and request tracing.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::sse;
use crate::state::AppState;

/// Build the complete router.
///
/// - `GET /health` -- liveness probe
/// - `GET /api/current` -- held reading and arbiter counters
/// - `GET /api/stream` -- server-sent event stream of accepted readings
/// - `GET /api/webhook` -- webhook description
/// - `POST /api/webhook` -- inbound uplink envelope
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/current", get(handlers::current))
        .route("/api/stream", get(sse::stream_updates))
        .route(
            "/api/webhook",
            get(handlers::webhook_info).post(handlers::webhook_ingest),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
