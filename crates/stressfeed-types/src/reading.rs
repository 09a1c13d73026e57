//! The canonical telemetry sample and its parts.
//!
//! A [`Reading`] is what every source adapter produces after extraction,
//! regardless of whether the raw payload arrived over the broker, from the
//! object-storage bucket, or from the document database.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::instant::EpochMillis;

// ---------------------------------------------------------------------------
// Stress level
// ---------------------------------------------------------------------------

/// Device-reported stress level.
///
/// The known domain is 1 (low) through 4 (critical). Zero means the field
/// was missing or unusable; it is carried as a present-but-minimal value
/// rather than rejected.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
#[serde(transparent)]
pub struct StressLevel(u8);

impl StressLevel {
    /// Missing or unusable level.
    pub const UNKNOWN: Self = Self(0);
    /// Level 1.
    pub const LOW: Self = Self(1);
    /// Level 2.
    pub const MODERATE: Self = Self(2);
    /// Level 3.
    pub const HIGH: Self = Self(3);
    /// Level 4.
    pub const CRITICAL: Self = Self(4);

    /// Highest level in the known domain.
    pub const MAX: u8 = 4;

    /// Build a level from a raw integer. Anything outside `0..=4` maps to
    /// [`StressLevel::UNKNOWN`].
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_raw(raw: u64) -> Self {
        if raw <= Self::MAX as u64 {
            Self(raw as u8)
        } else {
            Self::UNKNOWN
        }
    }

    /// The raw integer value.
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Human-readable label for logs and the dashboard.
    pub const fn label(self) -> &'static str {
        match self.0 {
            1 => "low",
            2 => "moderate",
            3 => "high",
            4 => "critical",
            _ => "unknown",
        }
    }
}

impl core::fmt::Display for StressLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({})", self.0, self.label())
    }
}

// ---------------------------------------------------------------------------
// Source tag
// ---------------------------------------------------------------------------

/// Which upstream path produced a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// Live broker subscription.
    PushFeed,
    /// Polled object-storage bucket.
    ObjectStore,
    /// Polled document database (documents not written by the webhook).
    Database,
    /// Polled document database, document written by the inbound webhook.
    WebhookDirect,
}

impl SourceTag {
    /// Discriminator value the webhook writes into `upload_method`.
    pub const WEBHOOK_UPLOAD_METHOD: &'static str = "ttn_webhook";

    /// Stable name used in logs and serialized output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PushFeed => "push_feed",
            Self::ObjectStore => "object_store",
            Self::Database => "database",
            Self::WebhookDirect => "webhook_direct",
        }
    }

    /// Whether readings from this source retain their original envelope.
    pub const fn retains_raw_payload(self) -> bool {
        matches!(self, Self::Database | Self::WebhookDirect)
    }

    /// Classify a database document by its `upload_method` field.
    pub fn for_document(document: &serde_json::Value) -> Self {
        match document.get("upload_method").and_then(serde_json::Value::as_str) {
            Some(Self::WEBHOOK_UPLOAD_METHOD) => Self::WebhookDirect,
            _ => Self::Database,
        }
    }
}

impl core::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Who (or what) a reading belongs to.
///
/// Mirrors whatever the source supplied. Never used for equality or
/// ordering decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Identity {
    /// Display name of the wearer or device user.
    pub username: String,
    /// Opaque contact handle (device EUI or address).
    pub contact: String,
    /// Device identifier as reported by the network, if any.
    pub device_id: String,
}

impl Identity {
    /// Fallback display name when no source field supplies one.
    pub const UNKNOWN_USER: &'static str = "Unknown User";
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Canonical normalized telemetry sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Reading {
    /// Reported stress level.
    pub stress_level: StressLevel,
    /// When the sample was taken, or [`EpochMillis::UNKNOWN`].
    pub instant: EpochMillis,
    /// When the source received the sample; the fallback for ordering when
    /// `instant` is unknown.
    pub received_at: EpochMillis,
    /// Origin of this reading.
    pub source: SourceTag,
    /// Who the reading belongs to.
    pub identity: Identity,
    /// Source-specific decoded body, carried for display only.
    pub decoded_payload: serde_json::Value,
    /// Original envelope, kept only for database-backed sources.
    pub raw_payload: Option<serde_json::Value>,
}

impl Reading {
    /// Build a minimal reading with no identity or payload attached.
    ///
    /// Handy for synthetic comparisons that bypass extraction.
    pub fn new(source: SourceTag, stress_level: StressLevel, instant: EpochMillis) -> Self {
        Self {
            stress_level,
            instant,
            received_at: EpochMillis::UNKNOWN,
            source,
            identity: Identity::default(),
            decoded_payload: serde_json::Value::Object(serde_json::Map::new()),
            raw_payload: None,
        }
    }

    /// Attach a received-at time.
    #[must_use]
    pub const fn with_received_at(mut self, received_at: EpochMillis) -> Self {
        self.received_at = received_at;
        self
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn stress_level_domain() {
        assert_eq!(StressLevel::from_raw(0), StressLevel::UNKNOWN);
        assert_eq!(StressLevel::from_raw(3), StressLevel::HIGH);
        assert_eq!(StressLevel::from_raw(4), StressLevel::CRITICAL);
        assert_eq!(StressLevel::from_raw(5), StressLevel::UNKNOWN);
        assert_eq!(StressLevel::from_raw(u64::MAX), StressLevel::UNKNOWN);
        assert_eq!(StressLevel::MODERATE.label(), "moderate");
    }

    #[test]
    fn stress_level_serializes_as_integer() {
        let json = serde_json::to_string(&StressLevel::HIGH).unwrap();
        assert_eq!(json, "3");
    }

    #[test]
    fn source_tag_from_upload_method() {
        let webhook = serde_json::json!({ "upload_method": "ttn_webhook" });
        let manual = serde_json::json!({ "upload_method": "manual" });
        let bare = serde_json::json!({ "stress_level": 2 });
        assert_eq!(SourceTag::for_document(&webhook), SourceTag::WebhookDirect);
        assert_eq!(SourceTag::for_document(&manual), SourceTag::Database);
        assert_eq!(SourceTag::for_document(&bare), SourceTag::Database);
    }

    #[test]
    fn only_database_paths_keep_raw_payload() {
        assert!(SourceTag::Database.retains_raw_payload());
        assert!(SourceTag::WebhookDirect.retains_raw_payload());
        assert!(!SourceTag::PushFeed.retains_raw_payload());
        assert!(!SourceTag::ObjectStore.retains_raw_payload());
    }

    #[test]
    fn reading_round_trips_through_json() {
        let reading = Reading::new(
            SourceTag::PushFeed,
            StressLevel::LOW,
            EpochMillis::new(1_700_000_000_000),
        );
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["source"], "push_feed");
        assert_eq!(json["stress_level"], 1);
        assert_eq!(json["instant"], 1_700_000_000_000_i64);
    }
}
