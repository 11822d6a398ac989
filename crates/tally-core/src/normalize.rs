//! Date normalization for offline-captured input.
//!
//! Callers hand the engine loosely-typed date values (free-form strings,
//! already-canonical strings, unix timestamps). Everything is normalized to
//! one canonical UTC representation before it reaches the store. Unparsable
//! values normalize to `None` with a warning instead of failing the save
//! path; validating a missing required date is the caller's job.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical stored format: `2024-01-01T09:00:00.000Z`
const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Accepted fallback layouts for naive (zone-less) date strings, tried in
/// order. Naive values are interpreted as UTC.
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// A loosely-typed date value as accepted by the public API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DateTimeInput {
    /// Free-form or already-canonical date string
    Text(String),
    /// Unix timestamp in milliseconds
    UnixMillis(i64),
}

impl From<&str> for DateTimeInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for DateTimeInput {
    fn from(value: i64) -> Self {
        Self::UnixMillis(value)
    }
}

/// Render a UTC instant in the canonical stored format.
pub fn to_canonical(instant: DateTime<Utc>) -> String {
    instant.format(CANONICAL_FORMAT).to_string()
}

/// Normalize an optional loose date value.
///
/// `None` stays `None`; an unparsable value also becomes `None` (logged),
/// so the offline save path never fails on a bad date.
pub fn normalize_optional(value: Option<&DateTimeInput>) -> Option<String> {
    value.and_then(normalize)
}

/// Normalize one loose date value to the canonical format.
pub fn normalize(value: &DateTimeInput) -> Option<String> {
    match value {
        DateTimeInput::Text(raw) => normalize_str(raw),
        DateTimeInput::UnixMillis(millis) => match DateTime::from_timestamp_millis(*millis) {
            Some(instant) => Some(to_canonical(instant)),
            None => {
                tracing::warn!("Discarding out-of-range timestamp {millis}");
                None
            }
        },
    }
}

/// Normalize a date string to the canonical format.
///
/// Accepts RFC 3339 (any offset, converted to UTC), the naive layouts in
/// [`NAIVE_FORMATS`], and bare dates (`2024-01-01`, midnight UTC).
pub fn normalize_str(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(to_canonical(parsed.with_timezone(&Utc)));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(to_canonical(naive.and_utc()));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        return Some(to_canonical(midnight.and_utc()));
    }

    tracing::warn!("Discarding unparsable date value: {trimmed:?}");
    None
}
