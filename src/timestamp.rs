//! Timestamp parsing and the integer encoding used in the database.
//!
//! Timestamps are stored as unix microseconds so that SQL range predicates
//! compare numerically.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Row;

use crate::error::{HistoryError, Result};

/// Parse an RFC 3339 timestamp, or a bare `YYYY-MM-DD` date (midnight UTC).
///
/// Fractional seconds finer than a microsecond are rejected: they cannot be
/// stored, and rounding them would move window boundaries.
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return require_micros(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| HistoryError::invalid(format!("malformed timestamp: {input:?}")))
}

/// `InvalidInput` unless `ts` falls on a whole microsecond, the storage
/// resolution.
pub fn require_micros(ts: DateTime<Utc>) -> Result<DateTime<Utc>> {
    if ts.timestamp_subsec_nanos() % 1_000 != 0 {
        return Err(HistoryError::invalid(format!(
            "timestamp {} is finer than one microsecond",
            ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
        )));
    }
    Ok(ts)
}

pub fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

pub fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| HistoryError::invalid(format!("timestamp out of range: {micros}")))
}

/// Read a microsecond column as a UTC timestamp.
pub(crate) fn micros_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    from_micros(micros)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_rfc3339_with_offset() {
        let ts = parse_timestamp("2025-05-04T12:00:00+02:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 5, 4, 10, 0, 0).unwrap());
    }

    #[test]
    fn parses_bare_date_as_midnight() {
        let ts = parse_timestamp("2025-05-04").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 5, 4, 0, 0, 0).unwrap());
    }

    #[test]
    fn rejects_garbage() {
        let err = parse_timestamp("yesterday").unwrap_err();
        assert!(matches!(err, HistoryError::InvalidInput(_)));
    }

    #[test]
    fn rejects_sub_microsecond_precision() {
        let err = parse_timestamp("2025-01-10T00:00:00.0000002Z").unwrap_err();
        assert!(matches!(err, HistoryError::InvalidInput(_)));

        let ts = parse_timestamp("2025-01-10T00:00:00.000001Z").unwrap();
        assert_eq!(from_micros(to_micros(ts)).unwrap(), ts);
    }

    #[test]
    fn require_micros_checks_the_nanosecond_remainder() {
        let base = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap();
        assert!(require_micros(base + chrono::Duration::nanoseconds(3_000)).is_ok());
        assert!(require_micros(base + chrono::Duration::nanoseconds(300)).is_err());
    }

    #[test]
    fn micros_preserve_ordering() {
        let a = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 1).unwrap();
        assert!(to_micros(a) < to_micros(b));
        assert_eq!(from_micros(to_micros(b)).unwrap(), b);
    }
}
