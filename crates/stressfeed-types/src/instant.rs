//! Resolved points in time.
//!
//! Upstream sources disagree on timestamp encodings (seconds vs
//! milliseconds, numbers vs strings, ISO-8601 text). Everything is
//! normalized into [`EpochMillis`] before any comparison happens.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Milliseconds since the Unix epoch.
///
/// [`EpochMillis::UNKNOWN`] (zero) stands for "no usable timestamp" and is
/// definitionally the oldest value any reading can carry.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
#[serde(transparent)]
pub struct EpochMillis(#[ts(type = "number")] pub i64);

impl EpochMillis {
    /// The "unknown" instant: epoch zero.
    pub const UNKNOWN: Self = Self(0);

    /// Wrap a raw millisecond count.
    pub const fn new(millis: i64) -> Self {
        Self(millis)
    }

    /// The raw millisecond count.
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Whether this instant carries a real timestamp.
    pub const fn is_known(self) -> bool {
        self.0 != 0
    }

    /// Convert to a UTC date-time, or `None` for values outside chrono's range.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0).single()
    }
}

impl From<DateTime<Utc>> for EpochMillis {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value.timestamp_millis())
    }
}

impl core::fmt::Display for EpochMillis {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.to_datetime() {
            Some(dt) if self.is_known() => write!(f, "{}", dt.to_rfc3339()),
            _ => write!(f, "unknown({})", self.0),
        }
    }
}
