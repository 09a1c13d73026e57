//! Reading extraction.
//!
//! Maps a raw source payload into a canonical [`Reading`]. Pure and
//! infallible: missing fields fall back to defaults (`stress_level` 0,
//! username `"Unknown User"`, unknown instant) instead of raising.
//!
//! Nested broker fields are always consulted before flat ones, because a
//! flat `stress_level` key can show up as metadata noise inside a nested
//! payload.

use serde_json::{Map, Value};
use stressfeed_types::{EpochMillis, Identity, Reading, SourceTag, StressLevel};

use crate::envelope::{Envelope, Shape, first_present, first_string};
use crate::normalize::normalize;

/// Extract a reading from a raw payload.
pub fn extract(source: SourceTag, raw: &Value) -> Reading {
    extract_with_fallback(source, raw, None)
}

/// Extract a reading, using `storage_time` (e.g. an object's last-modified
/// time) when the payload carries no timestamp of its own.
pub fn extract_with_fallback(
    source: SourceTag,
    raw: &Value,
    storage_time: Option<EpochMillis>,
) -> Reading {
    let envelope = Envelope::parse(raw);
    let fallback = storage_time.unwrap_or(EpochMillis::UNKNOWN);

    let instant = first_present(envelope.timestamp_candidates())
        .map_or(fallback, |candidate| normalize(Some(candidate)));
    let received_at = first_present(envelope.received_at_candidates())
        .map_or(fallback, |candidate| normalize(Some(candidate)));

    let stress_level = first_present(envelope.stress_level_candidates())
        .map_or(StressLevel::UNKNOWN, stress_level_from);

    let identity = Identity {
        username: first_string(envelope.username_candidates())
            .unwrap_or(Identity::UNKNOWN_USER)
            .to_owned(),
        contact: first_string(envelope.contact_candidates())
            .unwrap_or_default()
            .to_owned(),
        device_id: first_string(envelope.device_id_candidates())
            .unwrap_or_default()
            .to_owned(),
    };

    let raw_payload = source.retains_raw_payload().then(|| {
        envelope
            .top()
            .raw_payload
            .as_ref()
            .filter(|v| !v.is_null())
            .unwrap_or(raw)
            .clone()
    });

    tracing::trace!(
        source = %source,
        shape = envelope.shape().as_str(),
        stress_level = stress_level.value(),
        instant = instant.as_millis(),
        received_at = received_at.as_millis(),
        "Extracted reading"
    );

    Reading {
        stress_level,
        instant,
        received_at,
        source,
        identity,
        decoded_payload: decoded_payload(&envelope, raw),
        raw_payload,
    }
}

/// Interpret a stress-level value: integers, integral floats, and digit
/// strings are accepted; anything else (or out of range) is unknown.
pub fn stress_level_from(value: &Value) -> StressLevel {
    match value {
        Value::Number(n) => n.as_u64().map_or_else(
            || n.as_f64().map_or(StressLevel::UNKNOWN, stress_level_from_float),
            StressLevel::from_raw,
        ),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_or(StressLevel::UNKNOWN, StressLevel::from_raw),
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => StressLevel::UNKNOWN,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn stress_level_from_float(value: f64) -> StressLevel {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
        StressLevel::from_raw(value as u64)
    } else {
        StressLevel::UNKNOWN
    }
}

fn decoded_payload(envelope: &Envelope, raw: &Value) -> Value {
    let top = envelope.top().decoded_payload.as_ref().filter(|v| !v.is_null());
    let nested = envelope
        .uplink()
        .and_then(|u| u.decoded_payload.as_ref())
        .filter(|v| !v.is_null());

    match (top, nested, envelope.shape()) {
        (Some(decoded), _, _) | (None, Some(decoded), _) => decoded.clone(),
        (None, None, Shape::Flat) => raw.clone(),
        (None, None, Shape::Uplink | Shape::Stored | Shape::Opaque) => Value::Object(Map::new()),
    }
}
