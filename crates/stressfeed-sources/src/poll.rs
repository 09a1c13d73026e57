//! Shared polling loop for the bucket and database adapters.
//!
//! Each poller runs on its own fixed interval. A tick that overruns
//! delays the next one instead of bursting to catch up. Every poll is
//! bounded by a timeout, and every failure is logged and forgotten: the
//! next tick simply tries again.

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SourceError;

/// Default upper bound on a single poll.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// What one poll cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The upstream had nothing to offer.
    Empty,
    /// The newest item was the same one fetched last time.
    Unchanged,
    /// The newest item was fetched but could not be used.
    Skipped,
    /// A reading was offered to the arbiter.
    Offered {
        /// Whether the arbiter kept it.
        accepted: bool,
    },
}

/// A source that produces at most one reading per poll.
pub trait PollingSource: Send {
    /// Name used in log fields.
    fn name(&self) -> &'static str;

    /// Fetch the newest item and offer it to the arbiter.
    fn poll_once(&mut self) -> impl Future<Output = Result<PollOutcome, SourceError>> + Send;
}

/// Interval and timeout for one poller.
#[derive(Debug, Clone, Copy)]
pub struct PollSchedule {
    /// Time between polls.
    pub interval: Duration,
    /// Upper bound on a single poll.
    pub timeout: Duration,
}

impl PollSchedule {
    /// Poll every `interval` with the default timeout.
    pub const fn every(interval: Duration) -> Self {
        Self {
            interval,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Run `source` until `cancel` fires.
///
/// The first poll happens immediately.
pub async fn run_poller<S: PollingSource>(
    mut source: S,
    schedule: PollSchedule,
    cancel: CancellationToken,
) {
    let name = source.name();
    let mut ticker = tokio::time::interval(schedule.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        source = name,
        interval_secs = schedule.interval.as_secs_f64(),
        "Poller started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                poll_with_timeout(&mut source, name, schedule.timeout).await;
            }
            () = cancel.cancelled() => {
                info!(source = name, "Poller shutting down");
                break;
            }
        }
    }
}

async fn poll_with_timeout<S: PollingSource>(
    source: &mut S,
    name: &'static str,
    timeout: Duration,
) {
    let outcome = tokio::time::timeout(timeout, source.poll_once())
        .await
        .unwrap_or(Err(SourceError::Timeout(timeout)));

    match outcome {
        Ok(PollOutcome::Empty) => debug!(source = name, "Poll found nothing"),
        Ok(PollOutcome::Unchanged) => debug!(source = name, "Poll found nothing new"),
        Ok(PollOutcome::Skipped) => debug!(source = name, "Poll skipped an unusable item"),
        Ok(PollOutcome::Offered { accepted }) => {
            debug!(source = name, accepted, "Poll offered a reading");
        }
        Err(e) => warn!(source = name, error = %e, "Poll failed, retrying next interval"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        polls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl PollingSource for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn poll_once(&mut self) -> Result<PollOutcome, SourceError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SourceError::Config("always fails".to_owned()))
            } else {
                Ok(PollOutcome::Empty)
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_cancelled_and_survives_errors() {
        let polls = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let source = Counting {
            polls: Arc::clone(&polls),
            fail: true,
        };

        let handle = tokio::spawn(run_poller(
            source,
            PollSchedule::every(Duration::from_secs(10)),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(25)).await;
        cancel.cancel();
        assert!(handle.await.is_ok());

        // Ticks at 0s, 10s, 20s.
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_promptly_when_already_cancelled() {
        let polls = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let source = Counting {
            polls: Arc::clone(&polls),
            fail: false,
        };
        run_poller(source, PollSchedule::every(Duration::from_secs(10)), cancel).await;
        assert!(polls.load(Ordering::SeqCst) <= 1);
    }
}
