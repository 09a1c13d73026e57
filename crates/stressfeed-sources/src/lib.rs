//! Source adapters for the stressfeed telemetry monitor.
//!
//! Three independent drivers feed the same [`FeedContext`]:
//!
//! - [`push`] -- a live NATS subscription to device uplinks
//! - [`bucket`] -- polls an object-store prefix for the newest JSON object
//! - [`database`] -- polls the document table for the newest document
//!
//! All I/O failures stop at this boundary. A failed poll or a malformed
//! message is logged and turns into "no reading this cycle"; nothing here
//! can disturb the arbiter.
//!
//! [`FeedContext`]: stressfeed_core::FeedContext

pub mod bucket;
pub mod database;
pub mod error;
pub mod poll;
pub mod push;

pub use bucket::{BucketAdapter, BucketConfig, DEFAULT_PREFIX, newest_json, s3_store};
pub use database::{
    DatabaseAdapter, DocumentStore, MemoryDocuments, PostgresConfig, PostgresDocuments,
    StoredDocument,
};
pub use error::SourceError;
pub use poll::{PollOutcome, PollSchedule, PollingSource, run_poller};
pub use push::{Delivery, PushFeedAdapter, PushFeedConfig, uplink_subject};
