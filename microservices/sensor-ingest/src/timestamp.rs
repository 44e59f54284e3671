//! Display timestamp resolution

use chrono::{NaiveDateTime, Timelike};
use std::collections::HashMap;

use crate::error::{ResolveCause, ResolveError};
use crate::reading::DisplayTimestamp;

/// Attribute carrying the device publish time
pub const PUBLISHED_AT: &str = "published_at";

/// UTC with optional fractional seconds, e.g. `2024-03-05T14:07:00.000Z`
const INPUT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// e.g. `03/05/2024 2:07 PM`
const DISPLAY_FORMAT: &str = "%m/%d/%Y %-I:%M %p";

/// Resolve the log timestamp from the event attributes. Never falls back
/// to the current time.
pub fn resolve_timestamp(
    attributes: &HashMap<String, String>,
) -> Result<DisplayTimestamp, ResolveError> {
    let raw = attributes.get(PUBLISHED_AT).ok_or_else(|| ResolveError {
        raw: String::new(),
        cause: ResolveCause::Missing,
    })?;

    format_published_at(raw)
        .map(DisplayTimestamp::new)
        .map_err(|cause| ResolveError {
            raw: raw.clone(),
            cause,
        })
}

fn format_published_at(raw: &str) -> Result<String, ResolveCause> {
    if raw.is_empty() {
        return Err(ResolveCause::Missing);
    }
    // chrono skips leading whitespace before numeric fields
    if raw.chars().any(char::is_whitespace) {
        return Err(ResolveCause::Whitespace);
    }

    let published = NaiveDateTime::parse_from_str(raw, INPUT_FORMAT)?;
    // chrono parses `:60` into a leap second
    if published.nanosecond() >= 1_000_000_000 {
        return Err(ResolveCause::LeapSecond);
    }
    Ok(published.format(DISPLAY_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(value: &str) -> Result<DisplayTimestamp, ResolveError> {
        let mut attributes = HashMap::new();
        attributes.insert(PUBLISHED_AT.to_string(), value.to_string());
        resolve_timestamp(&attributes)
    }

    fn display(value: &str) -> String {
        resolve(value).unwrap().as_str().to_string()
    }

    #[test]
    fn test_afternoon() {
        assert_eq!(display("2024-03-05T14:07:00.000Z"), "03/05/2024 2:07 PM");
    }

    #[test]
    fn test_fraction_is_optional() {
        assert_eq!(display("2024-03-05T14:07:59Z"), "03/05/2024 2:07 PM");
        assert_eq!(display("2024-03-05T14:07:59.5Z"), "03/05/2024 2:07 PM");
        assert_eq!(display("2024-03-05T14:07:59.123456789Z"), "03/05/2024 2:07 PM");
    }

    #[test]
    fn test_twelve_hour_boundaries() {
        assert_eq!(display("2023-12-31T00:05:00.000Z"), "12/31/2023 12:05 AM");
        assert_eq!(display("2023-07-04T12:00:00.000Z"), "07/04/2023 12:00 PM");
        assert_eq!(display("2023-07-04T09:30:00.000Z"), "07/04/2023 9:30 AM");
        assert_eq!(display("2023-07-04T23:59:00.000Z"), "07/04/2023 11:59 PM");
    }

    #[test]
    fn test_missing_attribute() {
        let err = resolve_timestamp(&HashMap::new()).unwrap_err();
        assert!(matches!(err.cause, ResolveCause::Missing));
        assert_eq!(err.raw, "");
    }

    #[test]
    fn test_empty_attribute() {
        let err = resolve("").unwrap_err();
        assert!(matches!(err.cause, ResolveCause::Missing));
    }

    #[test]
    fn test_malformed_values_rejected() {
        for raw in [
            "yesterday",
            "2024-03-05",
            "2024-03-05T14:07:00.000",
            "2024-03-05T14:07:00.000+01:00",
            "2024-13-05T14:07:00.000Z",
            "2024-02-30T14:07:00.000Z",
            "2024-03-05T14:07:00.000Zjunk",
        ] {
            let err = resolve(raw).unwrap_err();
            assert_eq!(err.raw, raw);
            assert!(matches!(err.cause, ResolveCause::Malformed(_)), "{:?}", raw);
        }

        for raw in ["2024-03-05T14:07:60.000Z", "2016-12-31T23:59:60Z"] {
            let err = resolve(raw).unwrap_err();
            assert_eq!(err.raw, raw);
            assert!(matches!(err.cause, ResolveCause::LeapSecond), "{:?}", raw);
        }
    }

    #[test]
    fn test_whitespace_rejected() {
        for raw in [" 2024-03-05T14:07:00.000Z", "2024-03-05 14:07:00.000Z"] {
            let err = resolve(raw).unwrap_err();
            assert!(matches!(err.cause, ResolveCause::Whitespace), "{:?}", raw);
        }
    }
}
