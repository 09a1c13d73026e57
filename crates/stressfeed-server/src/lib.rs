//! HTTP surface for the stressfeed telemetry monitor.
//!
//! - **Live stream** (`/api/stream`): server-sent events, one `uplink`
//!   per accepted reading, fed by the fanout hub
//! - **Current reading** (`/api/current`): the arbiter's held state
//! - **Webhook** (`/api/webhook`): stores inbound uplink envelopes for
//!   the database adapter to pick up
//! - **Health** (`/health`)

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod sse;
pub mod state;
pub mod webhook;

pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, spawn_server};
pub use state::{AppState, StreamSettings};
