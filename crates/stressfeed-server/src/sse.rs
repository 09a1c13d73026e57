//! Server-sent event stream of accepted readings.
//!
//! Clients connect to `GET /api/stream` and receive, in order:
//!
//! 1. one `connected` message, carrying the reconnect delay as `retry`
//! 2. one `uplink` message per reading the arbiter accepts
//! 3. a `keepalive` message on a fixed interval in between
//!
//! Each session owns a hub [`Subscription`] and its keepalive timer.
//! Both live inside the response stream, so when the client goes away
//! and Axum drops the stream, the timer stops and the subscription
//! unsubscribes itself, however the session ended. The stream also ends
//! on server shutdown, since open sessions would otherwise hold graceful
//! shutdown forever.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use chrono::Utc;
use futures::Stream;
use stressfeed_core::Subscription;
use stressfeed_types::StreamMessage;
use tokio::time::{Duration, Instant, Interval, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::state::AppState;

/// Lower bound on the keepalive period.
const MIN_KEEPALIVE: Duration = Duration::from_secs(1);

struct Session {
    subscription: Subscription,
    keepalive: Interval,
    retry: Duration,
    shutdown: CancellationToken,
    greeted: bool,
}

/// `GET /api/stream`
pub async fn stream_updates(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let settings = state.stream;
    let subscription = state.feed.hub.subscribe_stream(settings.buffer);
    debug!(subscription = %subscription.id(), "Live stream session opened");

    let period = settings.keepalive.max(MIN_KEEPALIVE);
    let first_keepalive = Instant::now()
        .checked_add(period)
        .unwrap_or_else(Instant::now);
    let mut keepalive = interval_at(first_keepalive, period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let session = Session {
        subscription,
        keepalive,
        retry: settings.retry,
        shutdown: state.shutdown.clone(),
        greeted: false,
    };

    Sse::new(futures::stream::unfold(session, next_event))
}

async fn next_event(mut session: Session) -> Option<(Result<Event, Infallible>, Session)> {
    if !session.greeted {
        session.greeted = true;
        let connected = StreamMessage::Connected {
            timestamp: Utc::now(),
        };
        let event = encode(&connected).retry(session.retry);
        return Some((Ok(event), session));
    }

    let message = tokio::select! {
        reading = session.subscription.recv() => StreamMessage::Uplink {
            data: reading?.as_ref().clone(),
        },
        _ = session.keepalive.tick() => StreamMessage::Keepalive {
            timestamp: Utc::now(),
        },
        () = session.shutdown.cancelled() => {
            debug!("Live stream closed for shutdown");
            return None;
        }
    };
    Some((Ok(encode(&message)), session))
}

fn encode(message: &StreamMessage) -> Event {
    Event::default().json_data(message).unwrap_or_else(|e| {
        warn!(kind = message.kind(), error = %e, "Failed to encode stream message");
        Event::default().comment("encoding failed")
    })
}
