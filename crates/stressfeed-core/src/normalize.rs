//! Timestamp normalization.
//!
//! Converts whatever a source put in a timestamp-shaped field into a
//! single comparable [`EpochMillis`]. Rules, first applicable wins:
//!
//! 1. absent, `null`, or empty string -> unknown
//! 2. number -> milliseconds if greater than 10^12, else seconds x 1000
//! 3. string of decimal digits -> parsed, then rule 2
//! 4. any other string -> calendar/timezone-aware date parse, else unknown
//! 5. anything else (bool, array, object) -> unknown
//!
//! Milliseconds since 2001 exceed 10^12 while seconds since 2001 do not,
//! so the threshold separates the two encodings without a unit field.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Number, Value};
use stressfeed_types::EpochMillis;

/// Numbers above this are already milliseconds; at or below, seconds.
pub const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// Seconds-to-milliseconds factor.
const MILLIS_PER_SECOND: i64 = 1000;

/// Text formats that carry an explicit `+hhmm` offset.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
];

/// Text formats without an offset; interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Normalize an optional JSON timestamp into [`EpochMillis`].
///
/// Total: never fails, worst case returns [`EpochMillis::UNKNOWN`].
pub fn normalize(raw: Option<&Value>) -> EpochMillis {
    match raw {
        None | Some(Value::Null) => EpochMillis::UNKNOWN,
        Some(Value::Number(n)) => from_number(n),
        Some(Value::String(s)) => normalize_str(s),
        Some(Value::Bool(_) | Value::Array(_) | Value::Object(_)) => EpochMillis::UNKNOWN,
    }
}

/// Normalize a textual timestamp (rules 1, 3, and 4).
pub fn normalize_str(raw: &str) -> EpochMillis {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return EpochMillis::UNKNOWN;
    }
    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed
            .parse::<i64>()
            .map_or(EpochMillis::UNKNOWN, from_integer);
    }
    parse_datetime(trimmed).map_or(EpochMillis::UNKNOWN, EpochMillis::from)
}

/// Apply the seconds/milliseconds threshold to an integer.
pub const fn from_integer(value: i64) -> EpochMillis {
    if value > MILLIS_THRESHOLD {
        EpochMillis::new(value)
    } else {
        EpochMillis::new(value.saturating_mul(MILLIS_PER_SECOND))
    }
}

fn from_number(n: &Number) -> EpochMillis {
    if let Some(i) = n.as_i64() {
        return from_integer(i);
    }
    if let Some(u) = n.as_u64() {
        return from_integer(i64::try_from(u).unwrap_or(i64::MAX));
    }
    n.as_f64().map_or(EpochMillis::UNKNOWN, from_float)
}

// `as` saturates on out-of-range floats, which is the behavior we want.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn from_float(value: f64) -> EpochMillis {
    if !value.is_finite() {
        return EpochMillis::UNKNOWN;
    }
    let millis = if value > MILLIS_THRESHOLD as f64 {
        value
    } else {
        value * 1000.0
    };
    EpochMillis::new(millis.trunc() as i64)
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOV_14_2023: i64 = 1_700_000_000_000;

    #[test]
    fn seconds_are_scaled_to_millis() {
        assert_eq!(normalize(Some(&json!(1_700_000_000))).as_millis(), NOV_14_2023);
    }

    #[test]
    fn millis_pass_through() {
        assert_eq!(normalize(Some(&json!(NOV_14_2023))).as_millis(), NOV_14_2023);
    }

    #[test]
    fn digit_string_matches_numeric_seconds() {
        assert_eq!(normalize(Some(&json!("1700000000"))).as_millis(), NOV_14_2023);
        assert_eq!(normalize(Some(&json!("1700000000000"))).as_millis(), NOV_14_2023);
    }

    #[test]
    fn iso_string_parses() {
        assert_eq!(
            normalize(Some(&json!("2023-11-14T22:13:20.000Z"))).as_millis(),
            NOV_14_2023
        );
        assert_eq!(
            normalize(Some(&json!("2023-11-14T23:13:20+01:00"))).as_millis(),
            NOV_14_2023
        );
    }

    #[test]
    fn absent_null_and_empty_are_unknown() {
        assert_eq!(normalize(None), EpochMillis::UNKNOWN);
        assert_eq!(normalize(Some(&Value::Null)), EpochMillis::UNKNOWN);
        assert_eq!(normalize(Some(&json!(""))), EpochMillis::UNKNOWN);
        assert_eq!(normalize(Some(&json!("   "))), EpochMillis::UNKNOWN);
    }

    #[test]
    fn garbage_is_unknown() {
        assert_eq!(normalize(Some(&json!("not-a-date"))), EpochMillis::UNKNOWN);
        assert_eq!(normalize(Some(&json!(true))), EpochMillis::UNKNOWN);
        assert_eq!(normalize(Some(&json!([1, 2]))), EpochMillis::UNKNOWN);
        assert_eq!(normalize(Some(&json!({ "ts": 1 }))), EpochMillis::UNKNOWN);
    }

    #[test]
    fn threshold_boundary_is_exclusive() {
        // Exactly 10^12 is still read as seconds.
        assert_eq!(
            from_integer(MILLIS_THRESHOLD).as_millis(),
            MILLIS_THRESHOLD.saturating_mul(1000)
        );
        assert_eq!(from_integer(MILLIS_THRESHOLD + 1).as_millis(), MILLIS_THRESHOLD + 1);
    }

    #[test]
    fn fractional_seconds_keep_millis() {
        assert_eq!(
            normalize(Some(&json!(1_700_000_000.25))).as_millis(),
            NOV_14_2023 + 250
        );
    }

    #[test]
    fn oversized_digit_string_is_unknown() {
        assert_eq!(
            normalize_str("99999999999999999999999999"),
            EpochMillis::UNKNOWN
        );
    }

    #[test]
    fn naive_and_textual_formats() {
        assert_eq!(normalize_str("2023-11-14 22:13:20").as_millis(), NOV_14_2023);
        assert_eq!(
            normalize_str("Tue, 14 Nov 2023 22:13:20 +0000").as_millis(),
            NOV_14_2023
        );
        assert_eq!(
            normalize_str("2023-11-14").as_millis(),
            NOV_14_2023 - (22 * 3600 + 13 * 60 + 20) * 1000
        );
    }

    #[test]
    fn huge_seconds_saturate() {
        assert_eq!(from_integer(i64::MIN).as_millis(), i64::MIN);
    }
}
