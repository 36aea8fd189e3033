use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
    Short,
    Cover,
    Hold,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::Short => "short",
            Action::Cover => "cover",
            Action::Hold => "hold",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    #[serde(skip)]
    pub ticker: String,
    pub action: Action,
    pub confidence: f64,
    pub quantity: u64,
    pub reasoning: String,
}

impl Decision {
    pub fn hold(ticker: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            action: Action::Hold,
            confidence: 0.0,
            quantity: 0,
            reasoning: reasoning.into(),
        }
    }
}
