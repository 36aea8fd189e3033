pub mod chart;
pub mod ticker;

pub use chart::ChartPriceSource;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ProviderError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub volume: Option<u64>,
}

#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    fn timeout(&self) -> Duration;

    /// Daily bars within `[start, end]`, oldest first. An empty history is a
    /// `DataUnavailable` error, never an empty `Ok`.
    async fn daily_bars(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError>;
}

/// Compact description of a price history, handed to analysts as context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSummary {
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub first_close: f64,
    pub last_close: f64,
    pub change_pct: f64,
    pub high: f64,
    pub low: f64,
    pub bars: usize,
}

impl PriceSummary {
    pub fn from_bars(bars: &[PriceBar]) -> Option<Self> {
        let first = bars.first()?;
        let last = bars.last()?;

        let high = bars
            .iter()
            .map(|b| b.high.unwrap_or(b.close))
            .fold(f64::MIN, f64::max);
        let low = bars
            .iter()
            .map(|b| b.low.unwrap_or(b.close))
            .fold(f64::MAX, f64::min);

        let change_pct = if first.close > 0.0 {
            (last.close - first.close) / first.close * 100.0
        } else {
            0.0
        };

        Some(Self {
            first_date: first.date,
            last_date: last.date,
            first_close: first.close,
            last_close: last.close,
            change_pct,
            high,
            low,
            bars: bars.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32, close: f64, high: Option<f64>, low: Option<f64>) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            open: None,
            high,
            low,
            close,
            volume: None,
        }
    }

    #[test]
    fn summarizes_history() {
        let bars = vec![
            bar(1, 200.0, Some(205.0), Some(195.0)),
            bar(4, 180.0, None, None),
            bar(5, 220.0, Some(230.0), Some(210.0)),
        ];
        let s = PriceSummary::from_bars(&bars).unwrap();
        assert_eq!(s.first_close, 200.0);
        assert_eq!(s.last_close, 220.0);
        assert!((s.change_pct - 10.0).abs() < 1e-9);
        assert_eq!(s.high, 230.0);
        assert_eq!(s.low, 180.0);
        assert_eq!(s.bars, 3);
        assert_eq!(s.last_date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    }

    #[test]
    fn empty_history_has_no_summary() {
        assert!(PriceSummary::from_bars(&[]).is_none());
    }
}
