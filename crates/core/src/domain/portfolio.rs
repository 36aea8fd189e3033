use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Shares held long.
    pub long: u64,
    /// Shares held short.
    pub short: u64,
    /// Average price paid per long share.
    pub long_cost_basis: f64,
    /// Average price received per short share.
    pub short_cost_basis: f64,
}

impl Position {
    pub fn net_shares(&self) -> i64 {
        self.long as i64 - self.short as i64
    }

    pub fn gross_shares(&self) -> u64 {
        self.long + self.short
    }

    pub fn exposure_at_cost(&self) -> f64 {
        self.long as f64 * self.long_cost_basis + self.short as f64 * self.short_cost_basis
    }
}

/// Snapshot of a portfolio handed into one analysis run. Runs never mutate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub cash: f64,
    pub margin_requirement: f64,
    pub positions: BTreeMap<String, Position>,
}

impl PortfolioState {
    /// All-cash portfolio with a flat position per ticker.
    pub fn flat<'a>(
        cash: f64,
        margin_requirement: f64,
        tickers: impl IntoIterator<Item = &'a String>,
    ) -> Self {
        Self {
            cash,
            margin_requirement,
            positions: tickers
                .into_iter()
                .map(|t| (t.clone(), Position::default()))
                .collect(),
        }
    }

    pub fn position(&self, ticker: &str) -> Position {
        self.positions.get(ticker).copied().unwrap_or_default()
    }

    /// Cash plus gross exposure, valuing `ticker` at `price` and every other
    /// position at cost basis.
    pub fn total_value(&self, ticker: &str, price: f64) -> f64 {
        let others: f64 = self
            .positions
            .iter()
            .filter(|(t, _)| t.as_str() != ticker)
            .map(|(_, p)| p.exposure_at_cost())
            .sum();
        let own = self.position(ticker).gross_shares() as f64 * price;
        self.cash.max(0.0) + others + own
    }
}
