//! Sensor reading types

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// The decoded wire payload. Absent or `null` fields are zero; a genuine
/// zero reading is indistinguishable from a missing one.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SensorPayload {
    #[serde(deserialize_with = "null_as_default")]
    pub temperature: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub humidity: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub pressure: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub air_quality: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub device: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Log-formatted timestamp, only produced by successful resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DisplayTimestamp(String);

impl DisplayTimestamp {
    pub(crate) fn new(formatted: String) -> Self {
        debug_assert!(!formatted.is_empty());
        Self(formatted)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A payload stamped with its resolved timestamp; what the sinks receive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    pub timestamp: DisplayTimestamp,
    pub device: String,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub air_quality: f64,
}

impl SensorReading {
    pub fn new(payload: SensorPayload, timestamp: DisplayTimestamp) -> Self {
        Self {
            timestamp,
            device: payload.device,
            temperature: payload.temperature,
            humidity: payload.humidity,
            pressure: payload.pressure,
            air_quality: payload.air_quality,
        }
    }
}
