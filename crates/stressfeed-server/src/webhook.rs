//! Turning an inbound webhook envelope into a stored document.
//!
//! The webhook does not commit to the arbiter. It writes a flattened
//! document tagged `upload_method = "ttn_webhook"`, and the database
//! adapter picks it up on its next poll like any other document.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};
use stressfeed_core::Envelope;
use stressfeed_core::envelope::{first_present, first_string};
use stressfeed_core::extract::stress_level_from;
use stressfeed_types::{Identity, SourceTag, StressLevel};

/// The parts of a stored document echoed back to the sender.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookSummary {
    /// Resolved wearer name.
    pub username: String,
    /// Resolved stress level.
    pub stress_level: StressLevel,
    /// Network device id, or empty.
    pub device_id: String,
    /// The sample time written into the document.
    pub timestamp: Value,
}

/// Build the stored document for `payload`, received at `now`.
pub fn stored_document(payload: &Value, now: DateTime<Utc>) -> (Value, WebhookSummary) {
    let envelope = Envelope::parse(payload);
    // Flat envelopes carry the uplink fields at the top level.
    let uplink = payload
        .get("uplink_message")
        .filter(|v| v.is_object())
        .unwrap_or(payload);
    let field = |name: &str| uplink.get(name).filter(|v| !v.is_null()).cloned();

    let stress_level = first_present(envelope.stress_level_candidates())
        .map_or(StressLevel::UNKNOWN, stress_level_from);
    let username = first_string(envelope.username_candidates())
        .unwrap_or(Identity::UNKNOWN_USER)
        .to_owned();

    let ids = envelope.device_ids();
    let device_id = ids
        .and_then(|i| i.device_id.as_ref())
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let device_address = ids
        .and_then(|i| first_string([i.dev_eui.as_ref(), i.device_id.as_ref()]))
        .unwrap_or_default()
        .to_owned();

    let now_iso = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    let timestamp = field("received_at").unwrap_or_else(|| Value::String(now_iso.clone()));

    let document = json!({
        "raw_payload": payload,
        "timestamp": timestamp,
        "stress_level": stress_level,
        "username": username,
        "device_address": device_address,
        "device_id": device_id,
        "application_id": envelope.application_id().unwrap_or_default(),
        "decoded_payload": field("decoded_payload").unwrap_or_else(|| Value::Object(Map::new())),
        "sender": format!("TTN Webhook ({device_id})"),
        "upload_timestamp": now_iso,
        "upload_method": SourceTag::WEBHOOK_UPLOAD_METHOD,
        "created_at": now_iso,
        "rx_metadata": field("rx_metadata").unwrap_or_else(|| Value::Array(Vec::new())),
        "settings": field("settings").unwrap_or_else(|| Value::Object(Map::new())),
        "frm_payload": field("frm_payload"),
        "f_port": field("f_port"),
        "f_cnt": field("f_cnt"),
    });

    let summary = WebhookSummary {
        username,
        stress_level,
        device_id,
        timestamp,
    };
    (document, summary)
}
