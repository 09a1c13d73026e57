//! Error types for the daemon binary.

/// Top-level startup error.
///
/// Only failures that make the whole process pointless end up here.
/// A misconfigured or unreachable adapter is logged and skipped instead.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: crate::config::ConfigError,
    },

    /// The HTTP server could not start.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: stressfeed_server::ServerError,
    },

    /// The log filter could not be built.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },
}
