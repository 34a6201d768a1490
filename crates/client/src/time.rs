//! Engine date-time format
//!
//! The engine exchanges timestamps as `yyyy-MM-dd'T'HH:mm:ss.SSSZ`,
//! e.g. `2024-03-01T10:15:30.000+0100`.

use chrono::{DateTime, FixedOffset};

/// `chrono` format string matching the engine's date-time format
pub const ENGINE_DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// Format a timestamp the way the engine expects it
pub fn format_engine_time(time: &DateTime<FixedOffset>) -> String {
    time.format(ENGINE_DATE_TIME_FORMAT).to_string()
}

/// Parse a timestamp in the engine's format
pub fn parse_engine_time(value: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    DateTime::parse_from_str(value, ENGINE_DATE_TIME_FORMAT)
}

/// Serde support for optional engine timestamps
///
/// `null`, a missing field and an empty string all map to `None`.
pub mod engine_time_opt {
    use chrono::{DateTime, FixedOffset};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &Option<DateTime<FixedOffset>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match time {
            Some(t) => serializer.serialize_str(&super::format_engine_time(t)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<FixedOffset>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref() {
            None | Some("") => Ok(None),
            Some(value) => super::parse_engine_time(value)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
