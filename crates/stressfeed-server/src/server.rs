//! HTTP server lifecycle.
//!
//! [`spawn_server`] binds eagerly, so an unusable address fails at
//! startup, then serves on a background task until the cancellation
//! token fires.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::router::build_router;
use crate::state::AppState;

/// Listen address.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 3000,
        }
    }
}

/// Errors that can occur when starting or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server hit a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}

/// Bind to `config` and serve until `cancel` fires.
pub async fn spawn_server(
    config: &ServerConfig,
    state: Arc<AppState>,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>, ServerError> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| ServerError::Bind(format!("invalid address: {e}")))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;
    info!(%addr, "HTTP server listening");

    let router = build_router(state);
    let handle = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
            .map_err(|e| ServerError::Serve(e.to_string()));
        match result {
            Ok(()) => info!("HTTP server stopped"),
            Err(e) => error!(error = %e, "HTTP server exited with error"),
        }
    });
    Ok(handle)
}
