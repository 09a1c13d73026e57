//! Push-feed adapter: a live NATS subscription to device uplinks.
//!
//! The broker publishes LoRaWAN uplinks on `v3.{application_id}.devices.{device}.up`.
//! One connection is shared by the whole process and stays up regardless
//! of how many dashboard observers are attached. Reconnecting with
//! backoff is left to the `async-nats` client; connection events only
//! get logged here.
//!
//! A message is one JSON envelope, or several separated by newlines.
//! Malformed lines are logged and dropped; they never stop the loop.

use futures::StreamExt;
use serde_json::Value;
use stressfeed_core::{FeedContext, extract};
use stressfeed_types::SourceTag;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SourceError;

/// Connection settings for the broker.
#[derive(Debug, Clone)]
pub struct PushFeedConfig {
    /// NATS server URL.
    pub url: String,
    /// Optional user name.
    pub user: Option<String>,
    /// Optional password.
    pub password: Option<String>,
    /// Application whose devices are followed.
    pub application_id: String,
}

/// Subject matching uplinks from every device of `application_id`.
pub fn uplink_subject(application_id: &str) -> String {
    format!("v3.{application_id}.devices.*.up")
}

/// Tally for one inbound broker message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Envelopes the arbiter kept.
    pub accepted: usize,
    /// Envelopes the arbiter turned down as stale.
    pub rejected: usize,
    /// Lines that were not JSON.
    pub malformed: usize,
}

/// Connect to the broker.
///
/// The initial connect is retried in the background, so an unreachable
/// broker at startup does not fail this call.
pub async fn connect(config: &PushFeedConfig) -> Result<async_nats::Client, SourceError> {
    let mut options = async_nats::ConnectOptions::new()
        .name("stressfeed")
        .retry_on_initial_connect()
        .event_callback(|event| async move {
            match event {
                async_nats::Event::Connected => info!("NATS connection established"),
                async_nats::Event::Disconnected => warn!("NATS connection lost, reconnecting"),
                other => warn!(event = %other, "NATS connection event"),
            }
        });

    if let (Some(user), Some(password)) = (&config.user, &config.password) {
        options = options.user_and_password(user.clone(), password.clone());
    }

    info!(url = %config.url, "Connecting to NATS server");
    options
        .connect(config.url.as_str())
        .await
        .map_err(|e| SourceError::Nats(format!("failed to connect to {}: {e}", config.url)))
}

/// Turns broker messages into readings for the arbiter.
#[derive(Debug, Clone)]
pub struct PushFeedAdapter {
    ctx: FeedContext,
    subject: String,
}

impl PushFeedAdapter {
    /// Follow uplinks of `application_id`.
    pub fn new(ctx: FeedContext, application_id: &str) -> Self {
        Self {
            ctx,
            subject: uplink_subject(application_id),
        }
    }

    /// The subject this adapter subscribes to.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Extract and offer every envelope in one message payload.
    pub fn handle_payload(&self, subject: &str, payload: &[u8]) -> Delivery {
        let mut delivery = Delivery::default();

        if let Ok(envelope) = serde_json::from_slice::<Value>(payload) {
            self.offer(&envelope, &mut delivery);
        } else {
            for line in payload.split(|b| *b == b'\n') {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                match serde_json::from_slice::<Value>(line) {
                    Ok(envelope) => self.offer(&envelope, &mut delivery),
                    Err(e) => {
                        delivery.malformed = delivery.malformed.saturating_add(1);
                        warn!(subject, error = %e, "Dropping malformed uplink");
                    }
                }
            }
        }

        debug!(
            subject,
            accepted = delivery.accepted,
            rejected = delivery.rejected,
            malformed = delivery.malformed,
            "Handled uplink message"
        );
        delivery
    }

    fn offer(&self, envelope: &Value, delivery: &mut Delivery) {
        let reading = extract(SourceTag::PushFeed, envelope);
        if self.ctx.offer(reading) {
            delivery.accepted = delivery.accepted.saturating_add(1);
        } else {
            delivery.rejected = delivery.rejected.saturating_add(1);
        }
    }

    /// Subscribe and feed the arbiter until `cancel` fires or the client
    /// is closed.
    pub async fn run(
        self,
        client: async_nats::Client,
        cancel: CancellationToken,
    ) -> Result<(), SourceError> {
        let mut subscriber = client
            .subscribe(self.subject.clone())
            .await
            .map_err(|e| {
                SourceError::Nats(format!("failed to subscribe to {}: {e}", self.subject))
            })?;
        info!(subject = %self.subject, "Subscribed to device uplinks");

        loop {
            tokio::select! {
                message = subscriber.next() => {
                    let Some(message) = message else {
                        error!(subject = %self.subject, "Uplink subscription ended");
                        break;
                    };
                    self.handle_payload(message.subject.as_str(), &message.payload);
                }
                () = cancel.cancelled() => {
                    info!(subject = %self.subject, "Push feed shutting down");
                    if let Err(e) = subscriber.unsubscribe().await {
                        debug!(error = %e, "Unsubscribe on shutdown failed");
                    }
                    break;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stressfeed_types::{EpochMillis, StressLevel};

    const SUBJECT: &str = "v3.stress-app.devices.band-01.up";

    fn adapter() -> PushFeedAdapter {
        PushFeedAdapter::new(FeedContext::new(), "stress-app")
    }

    fn uplink(level: u8, received_at: &str) -> String {
        serde_json::json!({
            "end_device_ids": { "device_id": "band-01", "dev_eui": "70B3D57ED0000001" },
            "uplink_message": {
                "decoded_payload": { "stress_level": level, "username": "Ama" },
                "received_at": received_at
            }
        })
        .to_string()
    }

    #[test]
    fn subject_follows_all_devices_of_one_application() {
        assert_eq!(adapter().subject(), "v3.stress-app.devices.*.up");
    }

    #[test]
    fn uplink_is_committed() {
        let adapter = adapter();
        let delivery =
            adapter.handle_payload(SUBJECT, uplink(3, "2023-11-14T22:13:20Z").as_bytes());
        assert_eq!(delivery.accepted, 1);

        let held = adapter.ctx.arbiter.current();
        assert_eq!(held.as_ref().map(|r| r.stress_level), Some(StressLevel::HIGH));
        assert_eq!(held.map(|r| r.instant), Some(EpochMillis::new(1_700_000_000_000)));
    }

    #[test]
    fn stale_uplink_is_rejected() {
        let adapter = adapter();
        adapter.handle_payload(SUBJECT, uplink(2, "2023-11-14T22:13:20Z").as_bytes());
        let delivery =
            adapter.handle_payload(SUBJECT, uplink(4, "2023-11-14T22:00:00Z").as_bytes());
        assert_eq!(delivery.rejected, 1);
        assert_eq!(
            adapter.ctx.arbiter.current().map(|r| r.stress_level),
            Some(StressLevel::MODERATE)
        );
    }

    #[test]
    fn malformed_lines_are_dropped_without_stopping_the_rest() {
        let adapter = adapter();
        let payload = format!(
            "{}\nnot json at all\n\n{}\n",
            uplink(1, "2023-11-14T22:13:20Z"),
            uplink(4, "2023-11-14T22:13:21Z")
        );
        let delivery = adapter.handle_payload(SUBJECT, payload.as_bytes());
        assert_eq!(
            delivery,
            Delivery {
                accepted: 2,
                rejected: 0,
                malformed: 1
            }
        );
        assert_eq!(
            adapter.ctx.arbiter.current().map(|r| r.stress_level),
            Some(StressLevel::CRITICAL)
        );
    }

    #[test]
    fn binary_garbage_is_absorbed() {
        let delivery = adapter().handle_payload(SUBJECT, &[0xff, 0xfe, 0x00]);
        assert_eq!(delivery.malformed, 1);
        assert_eq!(delivery.accepted, 0);
    }
}
