use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeSet;

use crate::analysts::AnalystKey;
use crate::domain::portfolio::PortfolioState;
use crate::error::AnalysisError;
use crate::market::ticker::to_crypto_pair;
use crate::time::{resolve_date_range, DateRange};

pub const DEFAULT_INITIAL_CASH: f64 = 100_000.0;

/// `tickers` as sent by clients: `"AAPL,TSLA"` or `["AAPL", "TSLA"]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TickerList {
    Joined(String),
    List(Vec<String>),
}

impl TickerList {
    fn entries(&self) -> Vec<&str> {
        match self {
            TickerList::Joined(s) => s.split(',').collect(),
            TickerList::List(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

/// Raw JSON body of `POST /api/analysis`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequestBody {
    #[serde(default)]
    pub tickers: Option<TickerList>,
    #[serde(default)]
    pub selected_analysts: Option<Vec<String>>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub initial_cash: Option<f64>,
    #[serde(default)]
    pub margin_requirement: Option<f64>,
    #[serde(default)]
    pub crypto: bool,
}

/// A validated analysis request.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    /// Deduplicated, in request order.
    pub tickers: Vec<String>,
    pub analysts: BTreeSet<AnalystKey>,
    pub model_name: String,
    pub range: DateRange,
    pub portfolio: PortfolioState,
}

impl AnalysisRequestBody {
    /// Validates the body against `today` (the default end date).
    pub fn validate(self, today: NaiveDate) -> Result<AnalysisRequest, AnalysisError> {
        let tickers = self.tickers()?;

        let model_name = self
            .model_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AnalysisError::validation("modelName is required"))?
            .to_string();

        let range = resolve_date_range(self.start_date.as_deref(), self.end_date.as_deref(), today)
            .map_err(|e| AnalysisError::validation(format!("{e:#}")))?;

        let cash = self.initial_cash.unwrap_or(DEFAULT_INITIAL_CASH);
        if !cash.is_finite() || cash < 0.0 {
            return Err(AnalysisError::validation(format!(
                "initialCash must be a non-negative number (got {cash})"
            )));
        }
        let margin = self.margin_requirement.unwrap_or(0.0);
        if !margin.is_finite() || margin < 0.0 {
            return Err(AnalysisError::validation(format!(
                "marginRequirement must be a non-negative number (got {margin})"
            )));
        }

        let analysts = self.analysts()?;
        let portfolio = PortfolioState::flat(cash, margin, &tickers);

        Ok(AnalysisRequest {
            tickers,
            analysts,
            model_name,
            range,
            portfolio,
        })
    }

    fn tickers(&self) -> Result<Vec<String>, AnalysisError> {
        let mut seen = BTreeSet::new();
        let mut tickers = Vec::new();
        for raw in self.tickers.iter().flat_map(TickerList::entries) {
            let t = raw.trim();
            if t.is_empty() {
                continue;
            }
            let t = if self.crypto {
                to_crypto_pair(t)
            } else {
                t.to_string()
            };
            if seen.insert(t.clone()) {
                tickers.push(t);
            }
        }

        if tickers.is_empty() {
            return Err(AnalysisError::validation("tickers must contain at least one symbol"));
        }
        Ok(tickers)
    }

    fn analysts(&self) -> Result<BTreeSet<AnalystKey>, AnalysisError> {
        let requested: Vec<&str> = self
            .selected_analysts
            .iter()
            .flatten()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();

        if requested.is_empty() {
            return Ok(AnalystKey::ALL.into_iter().collect());
        }

        let mut analysts = BTreeSet::new();
        for key in &requested {
            match key.parse::<AnalystKey>() {
                Ok(a) => {
                    analysts.insert(a);
                }
                Err(err) => tracing::warn!(%err, "skipping unknown analyst"),
            }
        }

        if analysts.is_empty() {
            return Err(AnalysisError::validation(format!(
                "selectedAnalysts has no known analysts: {}",
                requested.join(", ")
            )));
        }
        Ok(analysts)
    }
}
