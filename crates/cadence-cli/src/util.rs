use anyhow::{anyhow, Result};
use cadence_core::error::CoreError;
use cadence_core::timezone::{parse_timezone, resolve_local};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

const LOCAL_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"];

/// Parses an RFC 3339 instant, or a local date/time in `timezone`.
///
/// A bare date means midnight local time.
pub fn parse_datetime(input: &str, timezone: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    let tz = parse_timezone(timezone)?;
    let local = LOCAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
        .ok_or_else(|| {
            anyhow!(CoreError::Validation(format!(
                "could not parse '{}' as a date or time (use RFC 3339 or YYYY-MM-DD[ HH:MM])",
                input
            )))
        })?;
    Ok(resolve_local(&tz, local))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case("2024-03-01T09:30:00Z", "UTC", Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap())]
    #[case("2024-03-01T09:30:00+02:00", "UTC", Utc.with_ymd_and_hms(2024, 3, 1, 7, 30, 0).unwrap())]
    #[case("2024-03-01 09:30", "UTC", Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap())]
    #[case("2024-07-01 09:30", "America/New_York", Utc.with_ymd_and_hms(2024, 7, 1, 13, 30, 0).unwrap())]
    #[case("2024-01-15", "Europe/Berlin", Utc.with_ymd_and_hms(2024, 1, 14, 23, 0, 0).unwrap())]
    fn test_parse_datetime(#[case] input: &str, #[case] tz: &str, #[case] expected: DateTime<Utc>) {
        assert_eq!(parse_datetime(input, tz).unwrap(), expected);
    }

    #[test]
    fn test_parse_datetime_rejects_garbage() {
        assert!(parse_datetime("next tuesday", "UTC").is_err());
        assert!(parse_datetime("2024-01-01 10:00", "Not/AZone").is_err());
    }
}
