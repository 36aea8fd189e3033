//! Combines analyst signals and a risk assessment into one decision per ticker.
//!
//! Each direction is weighted by the sum of its signals' confidences. A shared
//! maximum resolves to hold; otherwise the winning direction's mean confidence
//! becomes the decision confidence and scales the share count within the
//! remaining position limit.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::analysts::AnalystKey;
use crate::domain::decision::{Action, Decision};
use crate::domain::signal::{AnalystSignal, Signal};
use crate::risk::RiskAssessment;

const MAX_CITED_ANALYSTS: usize = 3;
const DEFAULT_STEPS: u32 = 4;
// Millionths of a confidence point.
const WEIGHT_SCALE: f64 = 1_000_000.0;

/// Maps decision confidence (0-100) to the fraction of the share cap to trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantityScaling {
    /// `confidence / 100`.
    #[default]
    Linear,
    /// Confidence rounded down to a multiple of `100 / steps`.
    Stepped { steps: u32 },
}

impl QuantityScaling {
    /// Whole shares to trade out of `cap`. Never exceeds `cap`.
    pub fn quantity(&self, cap: u64, confidence: f64) -> u64 {
        if cap == 0 || !confidence.is_finite() || confidence <= 0.0 {
            return 0;
        }
        let confidence = confidence.min(100.0);
        let cap_f = cap as f64;
        let shares = match *self {
            QuantityScaling::Linear => (cap_f * confidence / 100.0).floor(),
            QuantityScaling::Stepped { steps } => {
                let steps = steps.max(1) as f64;
                let hit = (confidence * steps / 100.0).floor();
                (cap_f * hit / steps).floor()
            }
        };
        (shares.max(0.0) as u64).min(cap)
    }
}

impl fmt::Display for QuantityScaling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuantityScaling::Linear => f.write_str("linear"),
            QuantityScaling::Stepped { steps } => write!(f, "stepped:{steps}"),
        }
    }
}

impl FromStr for QuantityScaling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.split_once(':') {
            None if s == "linear" => Ok(QuantityScaling::Linear),
            None if s == "stepped" => Ok(QuantityScaling::Stepped {
                steps: DEFAULT_STEPS,
            }),
            Some(("stepped", n)) => match n.trim().parse::<u32>() {
                Ok(steps) if steps > 0 => Ok(QuantityScaling::Stepped { steps }),
                _ => Err(format!("stepped scaling needs a positive step count (got {n})")),
            },
            _ => Err(format!("unknown quantity scaling: {s} (expected linear or stepped:N)")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionAggregator {
    scaling: QuantityScaling,
}

impl DecisionAggregator {
    pub fn new(scaling: QuantityScaling) -> Self {
        Self { scaling }
    }

    pub fn scaling(&self) -> QuantityScaling {
        self.scaling
    }

    pub fn decide(
        &self,
        ticker: &str,
        signals: &BTreeMap<AnalystKey, AnalystSignal>,
        risk: &RiskAssessment,
    ) -> Decision {
        if signals.is_empty() {
            return Decision::hold(ticker, "No analyst signals available; holding.");
        }

        // Weights are summed in fixed point so that equal totals of decimal
        // confidences compare equal.
        let weights = Signal::ALL.map(|dir| {
            let w: i64 = signals
                .values()
                .filter(|s| s.signal == dir)
                .map(|s| weight_units(s.confidence))
                .sum();
            (dir, w)
        });
        let total_weight: i64 = weights.iter().map(|(_, w)| w).sum();
        let top = weights.iter().map(|(_, w)| *w).max().unwrap_or(0);
        let leaders: Vec<Signal> = weights
            .iter()
            .filter(|(_, w)| *w == top)
            .map(|(d, _)| *d)
            .collect();

        let &[winner] = leaders.as_slice() else {
            let tied = leaders.iter().map(Signal::as_str).collect::<Vec<_>>().join(" and ");
            return Decision::hold(
                ticker,
                format!(
                    "Signals tied between {tied} at {:.1} confidence weight each; holding.",
                    from_units(top)
                ),
            );
        };

        let mut backers: Vec<&AnalystSignal> =
            signals.values().filter(|s| s.signal == winner).collect();
        backers.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.analyst.cmp(&b.analyst))
        });
        let confidence = backers.iter().map(|s| s.confidence).sum::<f64>() / backers.len() as f64;

        let cited = backers
            .iter()
            .take(MAX_CITED_ANALYSTS)
            .map(|s| format!("{} ({:.0}%)", s.analyst.display_name(), s.confidence))
            .collect::<Vec<_>>()
            .join(", ");
        let consensus = format!(
            "{} view carries {:.1} of {:.1} confidence weight across {} of {} analyst(s), led by {}.",
            capitalize(winner.as_str()),
            from_units(top),
            from_units(total_weight),
            backers.len(),
            signals.len(),
            cited
        );

        let held_long = risk.current_position.max(0) as u64;
        let held_short = risk.current_position.min(0).unsigned_abs();
        let max_shares = risk.max_shares();

        let (action, cap) = match winner {
            Signal::Neutral => {
                return Decision {
                    ticker: ticker.to_string(),
                    action: Action::Hold,
                    confidence,
                    quantity: 0,
                    reasoning: format!("{consensus} Holding."),
                };
            }
            Signal::Bullish if held_short > 0 => (Action::Cover, max_shares.min(held_short)),
            Signal::Bullish => (Action::Buy, max_shares),
            Signal::Bearish if held_long > 0 => (Action::Sell, max_shares.min(held_long)),
            Signal::Bearish => (Action::Short, max_shares),
        };

        let quantity = self.scaling.quantity(cap, confidence);
        let sizing = if quantity > 0 {
            format!(
                "{} {quantity} of {cap} share(s) allowed by the ${:.2} remaining limit at ${:.2}.",
                capitalize(action.as_str()),
                risk.remaining_limit,
                risk.current_price
            )
        } else {
            format!(
                "Position limit allows no shares to {} at the current price.",
                action.as_str()
            )
        };

        Decision {
            ticker: ticker.to_string(),
            action,
            confidence,
            quantity,
            reasoning: format!("{consensus} {sizing}"),
        }
    }
}

fn weight_units(confidence: f64) -> i64 {
    (confidence * WEIGHT_SCALE).round() as i64
}

fn from_units(units: i64) -> f64 {
    units as f64 / WEIGHT_SCALE
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
