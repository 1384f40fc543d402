//! # Canonical Timestamps
//!
//! Every persisted or compared date in EdgeSync uses one textual form:
//! `YYYY-MM-DD HH:MM:SS`, no fraction, no offset.
//!
//! ## Parsing Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Timestamp Parsing                                  │
//! │                                                                         │
//! │  1. Strict:  "2025-07-08 10:15:00"           → as is                   │
//! │  2. Loose:   "2025-07-08 10:15:00.123"       → fraction dropped        │
//! │              "2025-07-08T10:15:00"           → 'T' accepted            │
//! │              "2025-07-08T10:15:00+02:00"     → converted to UTC        │
//! │              "2025-07-08"                    → midnight                │
//! │  3. Anything else                            → None (caller decides)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Comparisons happen on the parsed value, which orders exactly like the
//! canonical text does.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::CoreError;

/// The canonical `strftime` pattern.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Naive layouts accepted by the loose parser, tried in order.
const LOOSE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// A second-precision timestamp in canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    /// Wraps a naive date-time, truncating sub-second precision.
    pub fn from_naive(value: NaiveDateTime) -> Self {
        Timestamp(value.with_nanosecond(0).unwrap_or(value))
    }

    /// Watermark of an entity that has never been synchronized
    /// (`2025-07-07 00:00:00`).
    pub fn default_epoch() -> Self {
        let date = NaiveDate::from_ymd_opt(2025, 7, 7).unwrap_or_default();
        Timestamp(date.and_time(NaiveTime::MIN))
    }

    /// Converts a UTC instant (e.g. from a clock) to a timestamp.
    pub fn from_utc(value: DateTime<Utc>) -> Self {
        Self::from_naive(value.naive_utc())
    }

    /// Parses text, trying the strict form first and falling back to
    /// the loose layouts. Returns `None` for empty or unrecognized text.
    pub fn parse_loose(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, CANONICAL_FORMAT) {
            return Some(Self::from_naive(parsed));
        }

        for format in LOOSE_FORMATS {
            if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
                return Some(Self::from_naive(parsed));
            }
        }

        if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
            return Some(Self::from_utc(parsed.with_timezone(&Utc)));
        }

        if let Ok(parsed) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%:z") {
            return Some(Self::from_utc(parsed.with_timezone(&Utc)));
        }

        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(Self::from_naive)
    }

    /// Parses a JSON value holding a date. Only strings can hold dates.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => Self::parse_loose(text),
            _ => None,
        }
    }

    /// Returns the canonical text form.
    pub fn to_canonical(&self) -> String {
        self.0.format(CANONICAL_FORMAT).to_string()
    }

    /// Returns the underlying naive date-time.
    pub fn as_naive(&self) -> NaiveDateTime {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(CANONICAL_FORMAT))
    }
}

impl FromStr for Timestamp {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_loose(s).ok_or_else(|| CoreError::InvalidTimestamp(s.to_string()))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_canonical())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_form_round_trips() {
        let ts: Timestamp = "2025-07-08 10:15:30".parse().unwrap();
        assert_eq!(ts.to_string(), "2025-07-08 10:15:30");
    }

    #[test]
    fn test_loose_forms() {
        assert_eq!(
            Timestamp::parse_loose("2025-07-08T10:15:30.000000Z").unwrap().to_string(),
            "2025-07-08 10:15:30"
        );
        assert_eq!(
            Timestamp::parse_loose("2025-07-08T12:15:30+02:00").unwrap().to_string(),
            "2025-07-08 10:15:30"
        );
        assert_eq!(
            Timestamp::parse_loose("2025-07-08 10:15:30.999").unwrap().to_string(),
            "2025-07-08 10:15:30"
        );
        assert_eq!(
            Timestamp::parse_loose("2025-07-08").unwrap().to_string(),
            "2025-07-08 00:00:00"
        );
    }

    #[test]
    fn test_garbage_is_none() {
        assert!(Timestamp::parse_loose("").is_none());
        assert!(Timestamp::parse_loose("   ").is_none());
        assert!(Timestamp::parse_loose("yesterday-ish").is_none());
        assert!(Timestamp::parse_loose("2025-13-45 99:99:99").is_none());
        assert!("not a date".parse::<Timestamp>().is_err());
    }

    #[test]
    fn test_json_values() {
        assert!(Timestamp::from_json(&Value::String("2025-07-08 00:00:00".into())).is_some());
        assert!(Timestamp::from_json(&Value::Null).is_none());
        assert!(Timestamp::from_json(&serde_json::json!(1720000000)).is_none());
    }

    #[test]
    fn test_default_epoch_matches_constant() {
        assert_eq!(Timestamp::default_epoch().to_string(), crate::DEFAULT_EPOCH);
    }

    #[test]
    fn test_ordering_matches_text() {
        let a: Timestamp = "2025-07-08 10:15:30".parse().unwrap();
        let b: Timestamp = "2025-07-08 10:15:31".parse().unwrap();
        assert!(a < b);
        assert!(a.to_string() < b.to_string());
    }

    #[test]
    fn test_serde_uses_canonical_text() {
        let ts: Timestamp = "2025-07-08T10:15:30Z".parse().unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2025-07-08 10:15:30\"");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }
}
