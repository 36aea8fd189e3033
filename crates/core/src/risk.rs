//! Per-ticker position limits.
//!
//! The limit is a fixed fraction of total portfolio value, less what is already
//! exposed in the ticker, and never more than the cash on hand.

use serde::Serialize;

use crate::domain::portfolio::PortfolioState;

pub const DEFAULT_POSITION_LIMIT_FRACTION: f64 = 0.20;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "RiskReport")]
pub struct RiskAssessment {
    pub ticker: String,
    pub current_price: f64,
    pub available_cash: f64,
    /// Net shares: positive long, negative short.
    pub current_position: i64,
    pub portfolio_value: f64,
    pub position_limit: f64,
    pub remaining_limit: f64,
    /// Carried from the portfolio for reporting; limits are cash-based.
    pub margin_requirement: f64,
}

impl RiskAssessment {
    /// Whole shares the remaining limit can buy at the current price.
    pub fn max_shares(&self) -> u64 {
        if !(self.current_price.is_finite() && self.current_price > 0.0) {
            return 0;
        }
        let shares = (self.remaining_limit / self.current_price).floor();
        if shares.is_finite() && shares > 0.0 {
            shares as u64
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RiskManager {
    position_limit_fraction: f64,
}

impl Default for RiskManager {
    fn default() -> Self {
        Self::new(DEFAULT_POSITION_LIMIT_FRACTION)
    }
}

impl RiskManager {
    pub fn new(position_limit_fraction: f64) -> Self {
        Self {
            position_limit_fraction: position_limit_fraction.clamp(0.0, 1.0),
        }
    }

    pub fn assess(&self, ticker: &str, current_price: f64, portfolio: &PortfolioState) -> RiskAssessment {
        let position = portfolio.position(ticker);
        let available_cash = portfolio.cash.max(0.0);

        let price_known = current_price.is_finite() && current_price > 0.0;
        let price = if price_known { current_price } else { 0.0 };

        let portfolio_value = portfolio.total_value(ticker, price);
        let (position_limit, remaining_limit) = if price_known {
            let limit = portfolio_value * self.position_limit_fraction;
            let exposure = position.gross_shares() as f64 * price;
            let remaining = (limit - exposure).max(0.0).min(available_cash);
            (limit, remaining)
        } else {
            (0.0, 0.0)
        };

        RiskAssessment {
            ticker: ticker.to_string(),
            current_price: price,
            available_cash,
            current_position: position.net_shares(),
            portfolio_value,
            position_limit,
            remaining_limit,
            margin_requirement: portfolio.margin_requirement,
        }
    }
}

/// Wire shape under `analyst_signals.risk_management_agent.<ticker>`.
#[derive(Debug, Clone, Serialize)]
pub struct RiskReport {
    pub remaining_position_limit: f64,
    pub current_price: f64,
    pub reasoning: RiskReasoning,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskReasoning {
    pub portfolio_value: f64,
    pub current_position: i64,
    pub position_limit: f64,
    pub remaining_limit: f64,
    pub available_cash: f64,
    pub margin_requirement: f64,
}

impl From<RiskAssessment> for RiskReport {
    fn from(r: RiskAssessment) -> Self {
        Self {
            remaining_position_limit: r.remaining_limit,
            current_price: r.current_price,
            reasoning: RiskReasoning {
                portfolio_value: r.portfolio_value,
                current_position: r.current_position,
                position_limit: r.position_limit,
                remaining_limit: r.remaining_limit,
                available_cash: r.available_cash,
                margin_requirement: r.margin_requirement,
            },
        }
    }
}
