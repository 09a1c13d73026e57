//! Error types for the source adapters.
//!
//! Every variant is an I/O or configuration failure at an adapter
//! boundary. None of them ever reach the arbiter: a failed poll or a
//! dropped message simply produces no reading for that cycle.

/// Errors that can occur while talking to an upstream source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Failed to connect to or subscribe on the NATS server.
    #[error("NATS error: {0}")]
    Nats(String),

    /// An object-store operation failed.
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A payload was not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),

    /// A poll did not finish within its deadline.
    #[error("poll timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Required configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),
}
