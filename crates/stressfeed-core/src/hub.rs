//! Subscription and fanout of accepted readings.
//!
//! [`FanoutHub`] keeps a registry of observers and hands every accepted
//! [`Reading`] to each of them. Delivery is synchronous and must not
//! block: observers that need to do real work (such as a streaming HTTP
//! session) buffer through a [`ChannelObserver`].
//!
//! A [`Subscription`] that falls behind skips ahead to the newest buffered
//! readings, and it discards anything not newer than what it already
//! delivered. Whatever it yields last is therefore the held reading.
//!
//! One failing observer never affects the others. Errors are logged at
//! `warn`, panics are caught and logged at `error`, and delivery moves on.
//!
//! Unsubscribing is idempotent. Dropping a [`Subscription`] unsubscribes
//! it, so cleanup happens even when the owning task ends abnormally.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use stressfeed_types::Reading;
use stressfeed_types::EpochMillis;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, trace, warn};

use crate::arbiter::resolve_instant;
use crate::error::ObserverError;

/// Handle identifying one registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl core::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Something that wants to hear about every accepted reading.
pub trait Observer: Send + Sync {
    /// Handle one delivered reading. Must not block.
    ///
    /// Called after the arbiter has released its lock, so reading the
    /// arbiter from here is fine. Commits racing on different threads can
    /// deliver out of order; [`resolve_instant`] tells which is newer.
    fn on_reading(&self, reading: &Arc<Reading>) -> Result<(), ObserverError>;
}

/// Registry of observers.
#[derive(Default)]
pub struct FanoutHub {
    observers: Mutex<BTreeMap<SubscriptionId, Arc<dyn Observer>>>,
    next_id: AtomicU64,
}

impl FanoutHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer and return its handle.
    pub fn subscribe(&self, observer: Arc<dyn Observer>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let count = {
            let mut observers = self.observers.lock();
            observers.insert(id, observer);
            observers.len()
        };
        info!(subscription = %id, observers = count, "Observer subscribed");
        id
    }

    /// Register a channel-backed observer whose handle unsubscribes itself
    /// when dropped.
    pub fn subscribe_stream(self: &Arc<Self>, capacity: usize) -> Subscription {
        let (observer, rx) = ChannelObserver::new(capacity);
        let id = self.subscribe(Arc::new(observer));
        Subscription {
            id,
            hub: Arc::clone(self),
            rx,
            last: None,
        }
    }

    /// Remove an observer. Returns whether anything was removed; removing
    /// twice, or removing an id that was never registered, is a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let (removed, count) = {
            let mut observers = self.observers.lock();
            let removed = observers.remove(&id).is_some();
            (removed, observers.len())
        };
        if removed {
            info!(subscription = %id, observers = count, "Observer unsubscribed");
            if count == 0 {
                info!("No observers remain, push feed stays connected for the next one");
            }
        } else {
            debug!(subscription = %id, "Unsubscribe for unknown observer ignored");
        }
        removed
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    /// Deliver a reading to every registered observer.
    ///
    /// Returns how many observers accepted it.
    pub fn publish(&self, reading: &Arc<Reading>) -> usize {
        // Snapshot the registry so observers may unsubscribe from inside
        // their own callback without deadlocking.
        let observers: Vec<(SubscriptionId, Arc<dyn Observer>)> = self
            .observers
            .lock()
            .iter()
            .map(|(id, observer)| (*id, Arc::clone(observer)))
            .collect();

        let mut delivered: usize = 0;
        for (id, observer) in observers {
            match catch_unwind(AssertUnwindSafe(|| observer.on_reading(reading))) {
                Ok(Ok(())) => delivered = delivered.saturating_add(1),
                Ok(Err(ObserverError::Closed)) => {
                    debug!(subscription = %id, "Observer closed, skipping delivery");
                }
                Ok(Err(e)) => {
                    warn!(subscription = %id, error = %e, "Observer failed to take reading");
                }
                Err(_) => {
                    error!(subscription = %id, "Observer panicked while handling reading");
                }
            }
        }
        delivered
    }
}

impl core::fmt::Debug for FanoutHub {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FanoutHub")
            .field("observers", &self.observer_count())
            .finish_non_exhaustive()
    }
}

/// Observer that forwards readings into a bounded ring buffer.
///
/// When the buffer is full the oldest reading is overwritten, never the
/// newest.
#[derive(Debug)]
pub struct ChannelObserver {
    tx: broadcast::Sender<Arc<Reading>>,
}

impl ChannelObserver {
    /// Create an observer and the receiving end of its buffer.
    ///
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<Arc<Reading>>) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl Observer for ChannelObserver {
    fn on_reading(&self, reading: &Arc<Reading>) -> Result<(), ObserverError> {
        match self.tx.send(Arc::clone(reading)) {
            Ok(_) => Ok(()),
            Err(_) => Err(ObserverError::Closed),
        }
    }
}

/// A channel-backed registration. Unsubscribes on drop.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    hub: Arc<FanoutHub>,
    rx: broadcast::Receiver<Arc<Reading>>,
    last: Option<EpochMillis>,
}

impl Subscription {
    /// This subscription's handle.
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next reading newer than the last one returned.
    ///
    /// Returns `None` once the observer has been removed from the hub.
    pub async fn recv(&mut self) -> Option<Arc<Reading>> {
        loop {
            match self.rx.recv().await {
                Ok(reading) => {
                    let instant = resolve_instant(&reading);
                    if self.last.is_some_and(|last| instant <= last) {
                        trace!(
                            subscription = %self.id,
                            instant = instant.as_millis(),
                            "Skipping stale delivery"
                        );
                        continue;
                    }
                    self.last = Some(instant);
                    return Some(reading);
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(subscription = %self.id, skipped, "Subscriber lagged, skipping ahead");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}
