use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::analysts::AnalystKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Bullish,
    Bearish,
    Neutral,
}

impl Signal {
    pub const ALL: [Signal; 3] = [Signal::Bullish, Signal::Bearish, Signal::Neutral];

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Bullish => "bullish",
            Signal::Bearish => "bearish",
            Signal::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bullish" => Ok(Signal::Bullish),
            "bearish" => Ok(Signal::Bearish),
            "neutral" => Ok(Signal::Neutral),
            other => Err(format!("unknown signal: {other}")),
        }
    }
}

/// One analyst's view on one ticker. Serializes to the `{confidence, reasoning,
/// signal}` shape of the response; the analyst and ticker are the map keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalystSignal {
    #[serde(skip)]
    pub analyst: AnalystKey,
    #[serde(skip)]
    pub ticker: String,
    pub signal: Signal,
    pub confidence: f64,
    pub reasoning: String,
}

impl AnalystSignal {
    pub fn new(
        analyst: AnalystKey,
        ticker: impl Into<String>,
        signal: Signal,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            analyst,
            ticker: ticker.into(),
            signal,
            confidence: clamp_confidence(confidence),
            reasoning: reasoning.into(),
        }
    }
}

pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        return 0.0;
    }
    confidence.clamp(0.0, 100.0)
}
