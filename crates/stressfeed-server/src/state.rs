//! Shared application state for the HTTP server.

use std::time::Duration;

use stressfeed_core::FeedContext;
use stressfeed_sources::DocumentStore;
use tokio_util::sync::CancellationToken;

/// Default interval between keepalive messages on the live stream.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(30);

/// Default reconnect delay advertised to stream clients.
pub const DEFAULT_RETRY: Duration = Duration::from_secs(5);

/// Default per-session buffer of undelivered readings.
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// Live-stream tuning.
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    /// Interval between keepalive messages.
    pub keepalive: Duration,
    /// Reconnect delay sent with the `connected` message.
    pub retry: Duration,
    /// Readings buffered per session before it counts as lagging.
    pub buffer: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            keepalive: DEFAULT_KEEPALIVE,
            retry: DEFAULT_RETRY,
            buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

/// State shared by every handler.
///
/// The webhook persists into `documents`; when no document store is
/// configured it acknowledges without storing.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Arbiter and hub.
    pub feed: FeedContext,
    /// Where webhook documents are written.
    pub documents: Option<DocumentStore>,
    /// Live-stream tuning.
    pub stream: StreamSettings,
    /// Ends open live streams so graceful shutdown can complete.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// State with no document store and default stream settings.
    pub fn new(feed: FeedContext) -> Self {
        Self {
            feed,
            documents: None,
            stream: StreamSettings::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Attach a document store for the webhook.
    #[must_use]
    pub fn with_documents(mut self, documents: DocumentStore) -> Self {
        self.documents = Some(documents);
        self
    }

    /// Override stream tuning.
    #[must_use]
    pub const fn with_stream(mut self, stream: StreamSettings) -> Self {
        self.stream = stream;
        self
    }

    /// End live streams when `shutdown` fires.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}
