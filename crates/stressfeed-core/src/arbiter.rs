//! The freshness arbiter.
//!
//! [`FreshnessArbiter`] owns the single "current reading" slot. Every
//! source adapter offers candidates through [`FreshnessArbiter::try_commit`],
//! concurrently and in any order. A candidate replaces the held reading
//! only when its resolved instant is strictly greater, so on an exact tie
//! the reading that got there first stays (first writer wins).
//!
//! # Atomicity
//!
//! The read-compare-write sequence runs inside one [`parking_lot::Mutex`]
//! critical section. The lock is synchronous, so no `.await` can sneak in
//! between reading the held value and replacing it; two adapters can never
//! both decide to accept against the same stale reading.
//!
//! Accepted readings are handed to the [`FanoutHub`] after the lock is
//! released, so observers may read the arbiter. Two commits racing on
//! different threads can reach observers in either order; stream
//! subscriptions drop whichever arrives second if it is older.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use stressfeed_types::{EpochMillis, Reading};
use tracing::{debug, trace};
use ts_rs::TS;

use crate::hub::FanoutHub;

/// The instant a reading is ordered by: `instant` when known, else its
/// `received_at`.
///
/// Readings built by the extractor already carry a resolved instant, but
/// callers may construct readings by hand, so the arbiter always
/// re-resolves.
pub const fn resolve_instant(reading: &Reading) -> EpochMillis {
    if reading.instant.is_known() {
        reading.instant
    } else {
        reading.received_at
    }
}

#[derive(Debug, Default)]
struct Slot {
    reading: Option<Arc<Reading>>,
    held_instant: EpochMillis,
    last_update: Option<DateTime<Utc>>,
    accepted: u64,
    rejected: u64,
}

/// Point-in-time copy of the current-reading slot.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct HeldState {
    /// The held reading, `None` until the first accept.
    pub reading: Option<Reading>,
    /// Resolved instant of the held reading.
    pub held_instant: EpochMillis,
    /// Wall-clock time of the last accept. Observability only.
    pub last_update: Option<DateTime<Utc>>,
    /// Number of candidates accepted so far.
    #[ts(type = "number")]
    pub accepted: u64,
    /// Number of candidates rejected so far.
    #[ts(type = "number")]
    pub rejected: u64,
}

/// Holds the current reading and decides which candidates replace it.
pub struct FreshnessArbiter {
    slot: Mutex<Slot>,
    hub: Arc<FanoutHub>,
}

impl FreshnessArbiter {
    /// Create an empty arbiter that notifies `hub` on every accept.
    pub fn new(hub: Arc<FanoutHub>) -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            hub,
        }
    }

    /// Offer a candidate. Returns `true` iff it became the held reading.
    ///
    /// An empty slot accepts anything, including a candidate whose instant
    /// is unknown. Otherwise the candidate must be strictly newer. A
    /// `false` return is a normal outcome, not an error.
    pub fn try_commit(&self, candidate: Reading) -> bool {
        let candidate_instant = resolve_instant(&candidate);

        let (reading, held_instant) = {
            let mut slot = self.slot.lock();
            let held_instant = slot.reading.as_deref().map(resolve_instant);

            if held_instant.is_some_and(|held| candidate_instant <= held) {
                slot.rejected = slot.rejected.saturating_add(1);
                trace!(
                    source = %candidate.source,
                    candidate = candidate_instant.as_millis(),
                    held = held_instant.map(EpochMillis::as_millis),
                    "Keeping held reading"
                );
                return false;
            }

            let reading = Arc::new(candidate);
            slot.reading = Some(Arc::clone(&reading));
            slot.held_instant = candidate_instant;
            slot.last_update = Some(Utc::now());
            slot.accepted = slot.accepted.saturating_add(1);
            (reading, held_instant)
        };

        let delivered = self.hub.publish(&reading);
        debug!(
            source = %reading.source,
            stress_level = %reading.stress_level,
            instant = %candidate_instant,
            previous = held_instant.map(EpochMillis::as_millis),
            delivered,
            "Accepted newer reading"
        );
        true
    }

    /// The held reading, if any.
    pub fn current(&self) -> Option<Arc<Reading>> {
        self.slot.lock().reading.clone()
    }

    /// Copy of the whole slot for display.
    pub fn snapshot(&self) -> HeldState {
        let slot = self.slot.lock();
        HeldState {
            reading: slot.reading.as_deref().cloned(),
            held_instant: slot.held_instant,
            last_update: slot.last_update,
            accepted: slot.accepted,
            rejected: slot.rejected,
        }
    }

    /// The hub this arbiter notifies.
    pub const fn hub(&self) -> &Arc<FanoutHub> {
        &self.hub
    }
}

impl core::fmt::Debug for FreshnessArbiter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let slot = self.slot.lock();
        f.debug_struct("FreshnessArbiter")
            .field("held_instant", &slot.held_instant)
            .field("accepted", &slot.accepted)
            .field("rejected", &slot.rejected)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ObserverError;
    use crate::hub::Observer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use stressfeed_types::{SourceTag, StressLevel};

    fn arbiter() -> FreshnessArbiter {
        FreshnessArbiter::new(Arc::new(FanoutHub::new()))
    }

    fn at(millis: i64, level: StressLevel) -> Reading {
        Reading::new(SourceTag::Database, level, EpochMillis::new(millis))
    }

    #[test]
    fn empty_slot_accepts_anything() {
        let arbiter = arbiter();
        assert!(arbiter.try_commit(at(0, StressLevel::UNKNOWN)));
        assert!(arbiter.current().is_some());
    }

    #[test]
    fn first_writer_wins_on_tie() {
        let arbiter = arbiter();
        assert!(arbiter.try_commit(at(5_000, StressLevel::MODERATE)));
        assert!(!arbiter.try_commit(at(5_000, StressLevel::CRITICAL)));
        let held = arbiter.current();
        assert_eq!(held.map(|r| r.stress_level), Some(StressLevel::MODERATE));
    }

    #[test]
    fn strictly_newer_replaces_and_older_is_rejected() {
        let arbiter = arbiter();
        assert!(arbiter.try_commit(at(5_000, StressLevel::LOW)));
        assert!(arbiter.try_commit(at(5_001, StressLevel::HIGH)));
        assert!(!arbiter.try_commit(at(4_000, StressLevel::CRITICAL)));

        let snapshot = arbiter.snapshot();
        assert_eq!(snapshot.held_instant, EpochMillis::new(5_001));
        assert_eq!(snapshot.accepted, 2);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(
            snapshot.reading.map(|r| r.stress_level),
            Some(StressLevel::HIGH)
        );
    }

    #[test]
    fn rejection_leaves_state_untouched() {
        let arbiter = arbiter();
        assert!(arbiter.try_commit(at(5_000, StressLevel::LOW)));
        let before = arbiter.snapshot();
        assert!(!arbiter.try_commit(at(1_000, StressLevel::CRITICAL)));
        let after = arbiter.snapshot();
        assert_eq!(before.reading, after.reading);
        assert_eq!(before.last_update, after.last_update);
        assert_eq!(before.held_instant, after.held_instant);
    }

    #[test]
    fn unknown_instant_loses_against_real_timestamp() {
        let arbiter = arbiter();
        assert!(arbiter.try_commit(at(1_700_000_000_000, StressLevel::LOW)));
        assert!(!arbiter.try_commit(at(0, StressLevel::CRITICAL)));
    }

    #[test]
    fn received_at_is_the_fallback() {
        let arbiter = arbiter();
        assert!(arbiter.try_commit(at(5_000, StressLevel::LOW)));
        let late = Reading::new(SourceTag::PushFeed, StressLevel::HIGH, EpochMillis::UNKNOWN)
            .with_received_at(EpochMillis::new(6_000));
        assert_eq!(resolve_instant(&late), EpochMillis::new(6_000));
        assert!(arbiter.try_commit(late));
    }

    #[test]
    fn held_instants_never_decrease() {
        let arbiter = arbiter();
        let sequence = [30, 10, 50, 50, 20, 70, 60, 0, 80];
        let mut last = EpochMillis::UNKNOWN;
        for millis in sequence {
            arbiter.try_commit(at(millis, StressLevel::LOW));
            let held = arbiter.snapshot().held_instant;
            assert!(held >= last);
            last = held;
        }
        assert_eq!(last, EpochMillis::new(80));
    }

    #[test]
    fn accepts_are_published_rejects_are_not() {
        #[derive(Default)]
        struct Counting(AtomicUsize);
        impl Observer for Counting {
            fn on_reading(&self, _reading: &Arc<Reading>) -> Result<(), ObserverError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let hub = Arc::new(FanoutHub::new());
        let counting = Arc::new(Counting::default());
        hub.subscribe(Arc::clone(&counting) as Arc<dyn Observer>);
        let arbiter = FreshnessArbiter::new(hub);

        arbiter.try_commit(at(10, StressLevel::LOW));
        arbiter.try_commit(at(5, StressLevel::LOW));
        arbiter.try_commit(at(20, StressLevel::LOW));
        assert_eq!(counting.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_adapters_always_end_on_the_newest() {
        for round in 0..50 {
            let arbiter = Arc::new(arbiter());
            let older = Arc::clone(&arbiter);
            let newer = Arc::clone(&arbiter);
            let (a, b) = tokio::join!(
                tokio::spawn(async move { older.try_commit(at(1_000, StressLevel::LOW)) }),
                tokio::spawn(async move { newer.try_commit(at(2_000, StressLevel::HIGH)) }),
            );
            assert!(a.is_ok() && b.is_ok(), "round {round} task failed");
            assert_eq!(arbiter.snapshot().held_instant, EpochMillis::new(2_000));
        }
    }

    #[test]
    fn observers_can_read_the_arbiter_during_delivery() {
        struct Reader {
            arbiter: std::sync::OnceLock<Arc<FreshnessArbiter>>,
            seen: parking_lot::Mutex<Vec<EpochMillis>>,
        }
        impl Observer for Reader {
            fn on_reading(&self, _reading: &Arc<Reading>) -> Result<(), ObserverError> {
                if let Some(arbiter) = self.arbiter.get() {
                    self.seen.lock().push(arbiter.snapshot().held_instant);
                }
                Ok(())
            }
        }

        let hub = Arc::new(FanoutHub::new());
        let reader = Arc::new(Reader {
            arbiter: std::sync::OnceLock::new(),
            seen: parking_lot::Mutex::new(Vec::new()),
        });
        hub.subscribe(Arc::clone(&reader) as Arc<dyn Observer>);
        let arbiter = Arc::new(FreshnessArbiter::new(hub));
        assert!(reader.arbiter.set(Arc::clone(&arbiter)).is_ok());

        assert!(arbiter.try_commit(at(10, StressLevel::LOW)));
        assert!(arbiter.try_commit(at(20, StressLevel::HIGH)));
        assert_eq!(
            *reader.seen.lock(),
            vec![EpochMillis::new(10), EpochMillis::new(20)]
        );
    }
}
