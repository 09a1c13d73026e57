//! REST endpoint handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Liveness probe |
//! | `GET` | `/api/current` | The held reading and arbiter counters |
//! | `GET` | `/api/webhook` | Webhook endpoint description |
//! | `POST` | `/api/webhook` | Store an inbound uplink envelope |

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use serde_json::{Value, json};
use stressfeed_core::HeldState;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::state::AppState;
use crate::webhook::stored_document;

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `GET /api/current`
///
/// `reading` is `null` until the first reading is accepted.
pub async fn current(State(state): State<Arc<AppState>>) -> Json<HeldState> {
    Json(state.feed.arbiter.snapshot())
}

/// `GET /api/webhook`
pub async fn webhook_info() -> impl IntoResponse {
    Json(json!({
        "status": "active",
        "message": "Uplink webhook endpoint",
        "endpoint": "/api/webhook",
        "methods": ["POST", "GET"],
        "description": "Send uplink messages from the network server to this endpoint",
        "timestamp": Utc::now(),
    }))
}

/// `POST /api/webhook`
///
/// Stores the envelope as a document. The reading reaches the arbiter
/// through the database adapter, not from here.
///
/// Without a document store this answers `200` with an `error` body, so
/// the network server does not keep retrying a delivery that can never
/// succeed.
pub async fn webhook_ingest(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("body is not valid JSON: {e}")))?;

    let Some(documents) = &state.documents else {
        warn!("Webhook received but no document store is configured");
        return Ok(Json(json!({ "error": "Database configuration missing" })));
    };

    let (document, summary) = stored_document(&payload, Utc::now());
    let id = documents.insert(&document).await?;

    info!(
        id,
        username = %summary.username,
        stress_level = %summary.stress_level,
        device_id = %summary.device_id,
        "Webhook uplink stored"
    );

    Ok(Json(json!({
        "success": true,
        "message": "Webhook data processed and stored",
        "insertedId": id.to_string(),
        "data": summary,
    })))
}
