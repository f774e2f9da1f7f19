//! Period resolution: optional `dd/mm/yyyy` start/end strings into a
//! concrete UTC interval plus the year/month bounds the engines consume.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};

use crate::error::EngineError;

/// A resolved filter period.
///
/// Invariant: `start <= end`. Months are 0-based (January = 0) to match the
/// month arithmetic in the metrics engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Period {
    /// First instant of the period, UTC 00:00:00.000.
    pub start: DateTime<Utc>,
    /// Last instant of the period, UTC 23:59:59.999.
    pub end: DateTime<Utc>,
    /// Year of the period start.
    pub year: i32,
    /// 0-based month of the period start.
    pub start_month: u32,
    /// 0-based month of the period end.
    pub end_month: u32,
    pub is_single_day: bool,
    /// Day-of-month when the period is a single day.
    pub day: Option<u32>,
}

impl Period {
    /// Year of the period end (differs from `year` for cross-year periods).
    pub fn end_year(&self) -> i32 {
        self.end.year()
    }
}

/// Resolve a period from optional `dd/mm/yyyy` strings, on a fixed clock.
///
/// - Empty start ⇒ the whole of `today`'s month.
/// - Start only, or end equal to start ⇒ a single day.
/// - Both ⇒ the inclusive span (single-day when they resolve identically).
pub fn resolve_period(
    start_str: &str,
    end_str: &str,
    today: NaiveDate,
) -> Result<Period, EngineError> {
    let start_str = start_str.trim();
    let end_str = end_str.trim();

    let (start_date, end_date, is_single_day, day);
    if start_str.is_empty() {
        let first = today
            .with_day(1)
            .ok_or_else(|| EngineError::InvalidPeriod("current month has no day 1".into()))?;
        start_date = first;
        end_date = last_day_of_month(today.year(), today.month0())
            .ok_or_else(|| EngineError::InvalidPeriod("current month out of range".into()))?;
        is_single_day = false;
        day = None;
    } else {
        let start = parse_dmy(start_str)?;
        if end_str.is_empty() || end_str == start_str {
            start_date = start;
            end_date = start;
            is_single_day = true;
            day = Some(start.day());
        } else {
            let end = parse_dmy(end_str)?;
            start_date = start;
            end_date = end;
            is_single_day = start == end;
            day = if is_single_day { Some(start.day()) } else { None };
        }
    }

    let start = Utc.from_utc_datetime(
        &start_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| EngineError::InvalidPeriod("invalid start of day".into()))?,
    );
    let end = Utc.from_utc_datetime(
        &end_date
            .and_hms_milli_opt(23, 59, 59, 999)
            .ok_or_else(|| EngineError::InvalidPeriod("invalid end of day".into()))?,
    );

    if start > end {
        return Err(EngineError::InvalidPeriod(format!(
            "start {} is after end {}",
            start_date, end_date
        )));
    }

    Ok(Period {
        start,
        end,
        year: start_date.year(),
        start_month: start_date.month0(),
        end_month: end_date.month0(),
        is_single_day,
        day,
    })
}

/// Resolve a period against the current UTC date.
pub fn resolve_period_now(start_str: &str, end_str: &str) -> Result<Period, EngineError> {
    resolve_period(start_str, end_str, Utc::now().date_naive())
}

/// Parse a strict `dd/mm/yyyy` date. Exactly three numeric parts, and the
/// result must be a real calendar date (no 31/02 rollover).
fn parse_dmy(value: &str) -> Result<NaiveDate, EngineError> {
    let parts: Vec<&str> = value.split('/').collect();
    if parts.len() != 3 {
        return Err(EngineError::InvalidPeriod(format!(
            "'{}' is not dd/mm/yyyy",
            value
        )));
    }
    let day: u32 = parts[0]
        .trim()
        .parse()
        .map_err(|_| EngineError::InvalidPeriod(format!("'{}' has a non-numeric day", value)))?;
    let month: u32 = parts[1]
        .trim()
        .parse()
        .map_err(|_| EngineError::InvalidPeriod(format!("'{}' has a non-numeric month", value)))?;
    let year: i32 = parts[2]
        .trim()
        .parse()
        .map_err(|_| EngineError::InvalidPeriod(format!("'{}' has a non-numeric year", value)))?;

    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| EngineError::InvalidPeriod(format!("'{}' is not a valid date", value)))
}

/// Last day of a (year, 0-based month), or None when out of chrono's range.
pub(crate) fn last_day_of_month(year: i32, month0: u32) -> Option<NaiveDate> {
    let (next_year, next_month0) = if month0 >= 11 {
        (year + 1, 0)
    } else {
        (year, month0 + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month0 + 1, 1)?.pred_opt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_empty_inputs_resolve_to_current_month() {
        let period = resolve_period("", "", day(2024, 2, 15)).unwrap();
        assert_eq!(period.start.to_rfc3339(), "2024-02-01T00:00:00+00:00");
        assert_eq!(period.end.to_rfc3339(), "2024-02-29T23:59:59.999+00:00");
        assert_eq!(period.year, 2024);
        assert_eq!(period.start_month, 1);
        assert_eq!(period.end_month, 1);
        assert!(!period.is_single_day);
        assert_eq!(period.day, None);
    }

    #[test]
    fn test_start_only_is_single_day() {
        let period = resolve_period("05/03/2024", "", day(2024, 1, 1)).unwrap();
        assert!(period.is_single_day);
        assert_eq!(period.day, Some(5));
        assert_eq!(period.start.to_rfc3339(), "2024-03-05T00:00:00+00:00");
        assert_eq!(period.end.to_rfc3339(), "2024-03-05T23:59:59.999+00:00");
    }

    #[test]
    fn test_equal_start_end_is_single_day() {
        let period = resolve_period("05/03/2024", "05/03/2024", day(2024, 1, 1)).unwrap();
        assert!(period.is_single_day);
        assert_eq!(period.day, Some(5));
    }

    #[test]
    fn test_multi_day_span_keeps_month_bounds() {
        let period = resolve_period("15/11/2023", "10/02/2024", day(2024, 1, 1)).unwrap();
        assert!(!period.is_single_day);
        assert_eq!(period.year, 2023);
        assert_eq!(period.start_month, 10);
        assert_eq!(period.end_month, 1);
        assert_eq!(period.end_year(), 2024);
    }

    #[test]
    fn test_start_after_end_is_invalid() {
        let err = resolve_period("10/03/2024", "05/03/2024", day(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPeriod(_)));
    }

    #[test]
    fn test_malformed_strings_are_invalid() {
        let today = day(2024, 1, 1);
        assert!(resolve_period("05-03-2024", "", today).is_err());
        assert!(resolve_period("05/03", "", today).is_err());
        assert!(resolve_period("aa/03/2024", "", today).is_err());
        // No silent rollover into March
        assert!(resolve_period("31/02/2024", "", today).is_err());
    }

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(last_day_of_month(2024, 1), Some(day(2024, 2, 29)));
        assert_eq!(last_day_of_month(2023, 11), Some(day(2023, 12, 31)));
    }
}
