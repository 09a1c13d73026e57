//! Error types for the fanout hub.
//!
//! The normalizer, extractor, and arbiter are infallible. The only
//! failure the core knows about is an observer refusing a delivery,
//! and even that never leaves the hub: it is logged and isolated.

/// Why an observer could not take a delivered reading.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The receiving side of the observer has gone away.
    #[error("observer closed")]
    Closed,

    /// The observer rejected the reading for its own reasons.
    #[error("observer failed: {0}")]
    Failed(String),
}
