//! Shared handle passed to every source adapter and HTTP handler.

use std::sync::Arc;

use stressfeed_types::Reading;

use crate::arbiter::FreshnessArbiter;
use crate::hub::FanoutHub;

/// The arbiter and hub, wired together.
///
/// Cheap to clone. Every adapter gets its own clone and offers readings
/// through [`FeedContext::offer`]; nothing else mutates the held reading.
#[derive(Debug, Clone)]
pub struct FeedContext {
    /// Holds the current reading.
    pub arbiter: Arc<FreshnessArbiter>,
    /// Notified by the arbiter on every accept.
    pub hub: Arc<FanoutHub>,
}

impl FeedContext {
    /// Create an empty arbiter with a fresh hub.
    pub fn new() -> Self {
        let hub = Arc::new(FanoutHub::new());
        let arbiter = Arc::new(FreshnessArbiter::new(Arc::clone(&hub)));
        Self { arbiter, hub }
    }

    /// Offer a candidate to the arbiter.
    pub fn offer(&self, reading: Reading) -> bool {
        self.arbiter.try_commit(reading)
    }
}

impl Default for FeedContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stressfeed_types::{EpochMillis, SourceTag, StressLevel};

    #[tokio::test]
    async fn offers_reach_stream_subscribers() {
        let ctx = FeedContext::new();
        let mut sub = ctx.hub.subscribe_stream(8);

        assert!(ctx.offer(Reading::new(
            SourceTag::ObjectStore,
            StressLevel::HIGH,
            EpochMillis::new(2_000),
        )));
        assert!(!ctx.offer(Reading::new(
            SourceTag::Database,
            StressLevel::LOW,
            EpochMillis::new(1_000),
        )));

        let got = sub.recv().await;
        assert_eq!(got.map(|r| r.source), Some(SourceTag::ObjectStore));
        assert!(Arc::ptr_eq(ctx.arbiter.hub(), &ctx.hub));
    }
}
