//! Start time derivation and calendar decomposition
//!
//! Timestamps are interpreted as UTC and stored timezone-naive. The day of
//! week is numbered 1 = Sunday through 7 = Saturday, and both `day` and
//! `weekday` carry it.

use crate::error::{EtlError, Result};
use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};
use serde_json::Value;

/// Calendar attributes of a start time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFields {
    pub hour: i32,
    pub day: i32,
    pub week: i32,
    pub month: i32,
    pub year: i32,
    pub weekday: i32,
}

/// Convert an epoch-millisecond `ts` value into a naive UTC timestamp
///
/// Integer and fractional milliseconds are accepted; fractions are kept to
/// microsecond precision.
pub fn epoch_millis_to_timestamp(ts: &Value) -> Result<NaiveDateTime> {
    let invalid = |reason: &str| EtlError::TimestampConversion {
        value: ts.to_string(),
        reason: reason.to_string(),
    };

    let Value::Number(n) = ts else {
        return Err(invalid("not a number"));
    };

    let converted = if let Some(millis) = n.as_i64() {
        DateTime::from_timestamp_millis(millis)
    } else if n.is_u64() {
        None
    } else {
        let millis = n.as_f64().ok_or_else(|| invalid("not a number"))?;
        let micros = (millis * 1000.0).round();
        if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
            None
        } else {
            DateTime::from_timestamp_micros(micros as i64)
        }
    };

    converted
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| invalid("out of range"))
}

/// Decompose a start time into its calendar attributes
pub fn calendar_fields(start_time: NaiveDateTime) -> CalendarFields {
    let day_of_week = start_time.weekday().number_from_sunday() as i32;
    CalendarFields {
        hour: start_time.hour() as i32,
        day: day_of_week,
        week: start_time.iso_week().week() as i32,
        month: start_time.month() as i32,
        year: start_time.year(),
        weekday: day_of_week,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_one_trillion_millis() {
        let start_time = epoch_millis_to_timestamp(&json!(1_000_000_000_000i64)).unwrap();
        assert_eq!(
            start_time,
            NaiveDate::from_ymd_opt(2001, 9, 9)
                .unwrap()
                .and_hms_opt(1, 46, 40)
                .unwrap()
        );

        let fields = calendar_fields(start_time);
        assert_eq!(
            fields,
            CalendarFields {
                hour: 1,
                day: 1,
                week: 36,
                month: 9,
                year: 2001,
                weekday: 1,
            }
        );
    }

    #[test]
    fn test_sparkify_log_timestamp() {
        // 2018-11-01 21:01:46.796 UTC, a Thursday
        let start_time = epoch_millis_to_timestamp(&json!(1541106106796i64)).unwrap();
        assert_eq!(start_time.and_utc().timestamp_subsec_millis(), 796);

        let fields = calendar_fields(start_time);
        assert_eq!(fields.hour, 21);
        assert_eq!(fields.day, 5);
        assert_eq!(fields.weekday, fields.day);
        assert_eq!(fields.week, 44);
        assert_eq!((fields.year, fields.month), (2018, 11));
    }

    #[test]
    fn test_iso_week_crosses_year_boundary() {
        // 2021-01-01 belongs to ISO week 53 of 2020; the year stays the calendar year
        let start_time = epoch_millis_to_timestamp(&json!(1609459200000i64)).unwrap();
        let fields = calendar_fields(start_time);
        assert_eq!(fields.week, 53);
        assert_eq!(fields.year, 2021);
        assert_eq!(fields.day, 6);
    }

    #[test]
    fn test_fractional_and_negative_millis() {
        let start_time = epoch_millis_to_timestamp(&json!(1.5)).unwrap();
        assert_eq!(start_time.and_utc().timestamp_micros(), 1500);

        let start_time = epoch_millis_to_timestamp(&json!(-1000)).unwrap();
        assert_eq!(start_time.and_utc().timestamp(), -1);
    }

    #[test]
    fn test_non_numeric_ts_fails() {
        for bad in [json!("1541106106796"), json!(null), json!(true), json!({"ms": 1})] {
            let err = epoch_millis_to_timestamp(&bad).unwrap_err();
            assert!(matches!(err, EtlError::TimestampConversion { .. }), "{bad}");
        }
    }

    #[test]
    fn test_out_of_range_ts_fails() {
        for bad in [json!(i64::MAX), json!(u64::MAX), json!(1e300)] {
            let err = epoch_millis_to_timestamp(&bad).unwrap_err();
            assert!(matches!(err, EtlError::TimestampConversion { .. }), "{bad}");
        }
    }
}
