//! Freshness-arbitration core for the stressfeed telemetry monitor.
//!
//! Three unsynchronized sources (a broker push feed, a polled
//! object-storage bucket, and a polled document database) all race to
//! update a single "current" reading. This crate holds the pieces that
//! decide who wins:
//!
//! - [`normalize`] -- turns any timestamp encoding into [`EpochMillis`]
//! - [`envelope`] -- typed view over the known raw payload shapes
//! - [`extract`] -- maps a raw payload into a canonical [`Reading`]
//! - [`arbiter`] -- holds the current reading and accepts strictly newer ones
//! - [`hub`] -- fans accepted readings out to any number of observers
//! - [`context`] -- the shared handle passed to every source adapter
//!
//! Nothing in this crate performs I/O and nothing in it fails: malformed
//! input degrades to defaults and unknown instants.
//!
//! [`EpochMillis`]: stressfeed_types::EpochMillis
//! [`Reading`]: stressfeed_types::Reading

pub mod arbiter;
pub mod context;
pub mod envelope;
pub mod error;
pub mod extract;
pub mod hub;
pub mod normalize;

pub use arbiter::{FreshnessArbiter, HeldState, resolve_instant};
pub use context::FeedContext;
pub use envelope::{Envelope, Shape};
pub use error::ObserverError;
pub use extract::{extract, extract_with_fallback};
pub use hub::{ChannelObserver, FanoutHub, Observer, Subscription, SubscriptionId};
pub use normalize::{normalize, normalize_str};
