//! ISO 8601 timestamps that keep their original text.
//!
//! The backend emits local date-times without an offset
//! (`2024-05-01T09:30:00.123`) while locally stamped values carry one. A
//! [`Timestamp`] parses either form to a UTC instant for ordering and day
//! grouping, and keeps the text it was built from so a server value can be
//! sent back verbatim (e.g. as the `from` history filter). Offset-less values
//! are taken as UTC.
//!
//! Payload fields that are merely informational go through
//! [`deserialize_lenient`], which also accepts the `[y, m, d, h, mi, s, ns]`
//! array form and maps anything unrecognizable to `None`.

use std::{cmp::Ordering, fmt, hash::Hash};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{ProtocolError, Result};

/// Offset-less layouts tried after RFC 3339, in order.
const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Timestamp with its wire text.
///
/// Equality, ordering, and hashing use the instant only.
#[derive(Debug, Clone)]
pub struct Timestamp {
    at: DateTime<Utc>,
    text: String,
}

impl Timestamp {
    /// Timestamp for a local instant, formatted as RFC 3339 with milliseconds.
    pub fn from_utc(at: DateTime<Utc>) -> Self {
        Self { at, text: at.to_rfc3339_opts(SecondsFormat::Millis, true) }
    }

    /// Parse RFC 3339 or an offset-less ISO 8601 date-time.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if let Ok(at) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Self { at: at.with_timezone(&Utc), text: trimmed.to_string() });
        }

        let naive = NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
            .ok_or_else(|| ProtocolError::InvalidTimestamp(text.to_string()))?;

        Ok(Self { at: Utc.from_utc_datetime(&naive), text: trimmed.to_string() })
    }

    /// Build from `[year, month, day, hour, minute, second, nanos]`.
    ///
    /// Date parts are required and the year has four digits; missing time
    /// parts are zero.
    fn from_parts(parts: &[i64]) -> Option<Self> {
        if parts.len() < 3 || parts.len() > 7 {
            return None;
        }
        let part = |index: usize| u32::try_from(parts.get(index).copied().unwrap_or(0)).ok();

        let year = i32::try_from(parts[0]).ok().filter(|year| (0..=9999).contains(year))?;
        let date = NaiveDate::from_ymd_opt(year, part(1)?, part(2)?)?;
        let time = NaiveTime::from_hms_nano_opt(part(3)?, part(4)?, part(5)?, part(6)?)?;
        let naive = date.and_time(time);

        Some(Self {
            at: Utc.from_utc_datetime(&naive),
            text: naive.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        })
    }

    /// Instant in UTC.
    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }

    /// Text as received or produced.
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.cmp(&other.at)
    }
}

impl Hash for Timestamp {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.at.hash(state);
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Deserialize an optional [`Timestamp`] without failing the enclosing value.
///
/// Accepts the string forms [`Timestamp::parse`] understands and the
/// date-time array form. `null`, absent, and unrecognizable values all
/// become `None`.
pub fn deserialize_lenient<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<Timestamp>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Parts(Vec<i64>),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(text)) => Timestamp::parse(&text).ok(),
        Some(Raw::Parts(parts)) => Timestamp::from_parts(&parts),
        Some(Raw::Other(_)) | None => None,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Timelike;

    use super::*;

    #[test]
    fn offset_less_text_is_preserved() {
        let ts = Timestamp::parse("2024-05-01T09:30:00.123").unwrap();
        assert_eq!(ts.as_str(), "2024-05-01T09:30:00.123");
        assert_eq!(ts.at().hour(), 9);
    }

    #[test]
    fn rfc3339_normalizes_to_utc() {
        let seoul = Timestamp::parse("2024-05-01T18:30:00+09:00").unwrap();
        let utc = Timestamp::parse("2024-05-01T09:30:00Z").unwrap();
        assert_eq!(seoul, utc);
    }

    #[test]
    fn local_stamp_round_trips() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        let ts = Timestamp::from_utc(now);
        assert_eq!(ts.as_str(), "2024-05-01T09:30:00.000Z");
        assert_eq!(Timestamp::parse(ts.as_str()).unwrap(), ts);
    }

    #[test]
    fn reject_garbage() {
        assert!(Timestamp::parse("yesterday").is_err());
    }

    #[test]
    fn space_separated_text_parses() {
        let ts = Timestamp::parse("2024-05-01 09:30:00").unwrap();
        assert_eq!(ts.as_str(), "2024-05-01 09:30:00");
        assert_eq!(ts, Timestamp::parse("2024-05-01T09:30:00Z").unwrap());
    }

    #[derive(Deserialize)]
    struct Stamped {
        #[serde(default, deserialize_with = "deserialize_lenient")]
        at: Option<Timestamp>,
    }

    fn lenient(json: &str) -> Option<Timestamp> {
        serde_json::from_str::<Stamped>(json).unwrap().at
    }

    #[test]
    fn lenient_accepts_array_form() {
        let ts = lenient(r#"{"at":[2024,5,1,9,30,0,123000000]}"#).unwrap();
        assert_eq!(ts, Timestamp::parse("2024-05-01T09:30:00.123Z").unwrap());
        assert_eq!(Timestamp::parse(ts.as_str()).unwrap(), ts);

        let minutes_only = lenient(r#"{"at":[2024,5,1,9,30]}"#).unwrap();
        assert_eq!(minutes_only, Timestamp::parse("2024-05-01T09:30:00Z").unwrap());
    }

    #[test]
    fn lenient_maps_unknown_values_to_none() {
        assert_eq!(lenient(r#"{"at":"soon"}"#), None);
        assert_eq!(lenient(r#"{"at":[2024,13,1]}"#), None);
        assert_eq!(lenient(r#"{"at":[2024]}"#), None);
        assert_eq!(lenient(r#"{"at":1714555800}"#), None);
        assert_eq!(lenient(r#"{"at":{"epochSecond":1}}"#), None);
        assert_eq!(lenient(r#"{"at":null}"#), None);
        assert_eq!(lenient("{}"), None);
    }
}
