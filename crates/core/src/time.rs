use std::time::Duration;

use chrono::Utc;

use crate::error::{Result, RiemlogError};

/// Whole seconds for a millisecond timestamp. Sub-second precision is
/// dropped; negative timestamps round toward negative infinity.
pub fn millis_to_seconds(millis: i64) -> i64 {
    millis.div_euclid(1000)
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| RiemlogError::Parse(format!("invalid duration {input}: {e}")))
}

/// Serde adapter writing durations the way config files spell them (`"5s"`).
pub mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration_str(&raw).map_err(serde::de::Error::custom)
    }
}
