//! Analyst catalog and the provider registry.
//!
//! The set of analysts is closed: every strategy is an [`AnalystKey`] variant and
//! is served by exactly one [`SignalProvider`] registered at startup.

pub mod llm_analyst;
pub mod registry;

pub use llm_analyst::LlmAnalyst;
pub use registry::{AnalystRegistry, EvaluationInput, SignalProvider};

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const AGENT_SUFFIX: &str = "_agent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AnalystKey {
    BenGraham,
    BillAckman,
    WarrenBuffett,
    NancyPelosi,
    Wsb,
    TechnicalAnalyst,
    FundamentalsAnalyst,
    SentimentAnalyst,
    ValuationAnalyst,
}

impl AnalystKey {
    pub const ALL: [AnalystKey; 9] = [
        AnalystKey::BenGraham,
        AnalystKey::BillAckman,
        AnalystKey::WarrenBuffett,
        AnalystKey::NancyPelosi,
        AnalystKey::Wsb,
        AnalystKey::TechnicalAnalyst,
        AnalystKey::FundamentalsAnalyst,
        AnalystKey::SentimentAnalyst,
        AnalystKey::ValuationAnalyst,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalystKey::BenGraham => "ben_graham",
            AnalystKey::BillAckman => "bill_ackman",
            AnalystKey::WarrenBuffett => "warren_buffett",
            AnalystKey::NancyPelosi => "nancy_pelosi",
            AnalystKey::Wsb => "wsb",
            AnalystKey::TechnicalAnalyst => "technical_analyst",
            AnalystKey::FundamentalsAnalyst => "fundamentals_analyst",
            AnalystKey::SentimentAnalyst => "sentiment_analyst",
            AnalystKey::ValuationAnalyst => "valuation_analyst",
        }
    }

    /// Key used in the `analyst_signals` map of the response.
    pub fn agent_name(&self) -> String {
        format!("{}{AGENT_SUFFIX}", self.as_str())
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AnalystKey::BenGraham => "Ben Graham",
            AnalystKey::BillAckman => "Bill Ackman",
            AnalystKey::WarrenBuffett => "Warren Buffett",
            AnalystKey::NancyPelosi => "Nancy Pelosi",
            AnalystKey::Wsb => "WallStreetBets",
            AnalystKey::TechnicalAnalyst => "Technical Analyst",
            AnalystKey::FundamentalsAnalyst => "Fundamentals Analyst",
            AnalystKey::SentimentAnalyst => "Sentiment Analyst",
            AnalystKey::ValuationAnalyst => "Valuation Analyst",
        }
    }

    /// Investing principles the analyst argues from.
    pub fn persona(&self) -> &'static [&'static str] {
        match self {
            AnalystKey::BenGraham => &[
                "Insist on a margin of safety by buying below intrinsic value (Graham Number, net-net).",
                "Emphasize financial strength: low leverage, ample current assets.",
                "Prefer stable earnings over multiple years and a consistent dividend record.",
                "Avoid speculative or high-growth assumptions; focus on proven metrics.",
            ],
            AnalystKey::BillAckman => &[
                "Look for high-quality, simple, predictable businesses with durable moats.",
                "Favor free cash flow generation and disciplined capital allocation.",
                "Consider activist catalysts that could unlock value.",
                "Take concentrated positions only with high conviction.",
            ],
            AnalystKey::WarrenBuffett => &[
                "Buy wonderful businesses at fair prices and hold for the long term.",
                "Demand a durable competitive advantage and consistent returns on equity.",
                "Favor conservative balance sheets and honest, shareholder-friendly management.",
                "Stay within the circle of competence; ignore short-term noise.",
            ],
            AnalystKey::NancyPelosi => &[
                "Weigh the impact of pending legislation and regulatory change on the company.",
                "Favor companies positioned to win government contracts and policy tailwinds.",
                "Track congressional trading activity and information asymmetry.",
                "Be biased toward action when policy momentum is clear.",
            ],
            AnalystKey::Wsb => &[
                "Hunt for meme potential, social media hype and retail momentum.",
                "Look for short squeeze setups: high short interest, small float.",
                "Think in terms of YOLO options plays and asymmetric upside.",
                "Be contrarian against institutional consensus; stay optimistic.",
            ],
            AnalystKey::TechnicalAnalyst => &[
                "Read trend, momentum and mean reversion from the price history.",
                "Weigh volatility regimes and recent drawdowns.",
                "Respect support and resistance levels.",
                "Ignore fundamentals; the chart is the signal.",
            ],
            AnalystKey::FundamentalsAnalyst => &[
                "Assess profitability, growth, financial health and valuation ratios.",
                "Compare margins and returns to sector norms.",
                "Penalize deteriorating balance sheets.",
                "Base conclusions on reported financials, not narratives.",
            ],
            AnalystKey::SentimentAnalyst => &[
                "Gauge news flow and insider activity for directional sentiment.",
                "Weigh the balance of positive and negative coverage.",
                "Discount stale or low-quality sources.",
                "Translate sentiment skew into a directional view.",
            ],
            AnalystKey::ValuationAnalyst => &[
                "Estimate intrinsic value with discounted cash flow and owner earnings.",
                "Compare intrinsic value to the current market price.",
                "Require a meaningful gap before taking a directional view.",
                "Stay neutral when the valuation gap is within estimation error.",
            ],
        }
    }
}

impl fmt::Display for AnalystKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalystKey {
    type Err = String;

    /// Accepts the bare key or the `<key>_agent` node name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let key = s.strip_suffix(AGENT_SUFFIX).unwrap_or(s);
        AnalystKey::ALL
            .into_iter()
            .find(|a| a.as_str() == key)
            .ok_or_else(|| format!("unknown analyst: {s}"))
    }
}

impl Serialize for AnalystKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
