use anyhow::Context;
use chrono::{Months, NaiveDate};
use serde::Serialize;

const DATE_FORMAT: &str = "%Y-%m-%d";

// Lookback used when only the end of the window is known.
const DEFAULT_LOOKBACK_MONTHS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Resolves the analysis window. Missing or blank `end` defaults to `today`;
/// missing or blank `start` defaults to three calendar months before `end`
/// (clamped to the last day of a shorter month).
pub fn resolve_date_range(
    start_arg: Option<&str>,
    end_arg: Option<&str>,
    today: NaiveDate,
) -> anyhow::Result<DateRange> {
    let end = match non_blank(end_arg) {
        Some(s) => parse_date(s).context("endDate must be in YYYY-MM-DD format")?,
        None => today,
    };

    let start = match non_blank(start_arg) {
        Some(s) => parse_date(s).context("startDate must be in YYYY-MM-DD format")?,
        None => end
            .checked_sub_months(Months::new(DEFAULT_LOOKBACK_MONTHS))
            .with_context(|| format!("cannot compute default startDate from {end}"))?,
    };

    anyhow::ensure!(
        start <= end,
        "startDate {start} must not be after endDate {end}"
    );

    Ok(DateRange { start, end })
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(s, DATE_FORMAT)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn defaults_to_three_months_before_today() {
        let r = resolve_date_range(None, None, d(2024, 12, 31)).unwrap();
        assert_eq!(r.end, d(2024, 12, 31));
        assert_eq!(r.start, d(2024, 9, 30));
    }

    #[test]
    fn default_start_clamps_to_month_end() {
        // 2024-05-31 minus three months lands on Feb 29 (leap year).
        let r = resolve_date_range(None, Some("2024-05-31"), d(2025, 1, 1)).unwrap();
        assert_eq!(r.start, d(2024, 2, 29));
    }

    #[test]
    fn blank_strings_count_as_missing() {
        let r = resolve_date_range(Some(""), Some("  "), d(2024, 6, 15)).unwrap();
        assert_eq!(r, DateRange { start: d(2024, 3, 15), end: d(2024, 6, 15) });
    }

    #[test]
    fn explicit_dates_are_kept() {
        let r = resolve_date_range(Some("2024-01-01"), Some("2024-12-31"), d(2026, 1, 1)).unwrap();
        assert_eq!(r, DateRange { start: d(2024, 1, 1), end: d(2024, 12, 31) });
    }

    #[test]
    fn rejects_bad_format_and_inverted_range() {
        assert!(resolve_date_range(Some("01/01/2024"), None, d(2024, 6, 1)).is_err());
        assert!(resolve_date_range(Some("2024-07-01"), Some("2024-06-01"), d(2024, 8, 1)).is_err());
    }
}
