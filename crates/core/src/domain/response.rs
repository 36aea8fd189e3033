use serde::Serialize;
use std::collections::BTreeMap;

use crate::analysts::AnalystKey;
use crate::domain::decision::Decision;
use crate::domain::signal::AnalystSignal;
use crate::risk::RiskAssessment;

pub const RISK_AGENT: &str = "risk_management_agent";
pub const PORTFOLIO_AGENT: &str = "portfolio_management_agent";

/// A provider that produced nothing for a ticker. Logged, never serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    /// Analyst agent name, or the price source name.
    pub source: String,
    pub reason: String,
}

/// Everything one ticker's analysis produced.
#[derive(Debug, Clone)]
pub struct TickerReport {
    pub ticker: String,
    pub signals: BTreeMap<AnalystKey, AnalystSignal>,
    pub failures: Vec<ProviderFailure>,
    pub risk: RiskAssessment,
    pub decision: Decision,
}

/// Body of a successful `POST /api/analysis`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisResponse {
    pub analyst_signals: AnalystSignals,
    pub decisions: BTreeMap<String, Decision>,
}

/// `<analyst>_agent -> ticker -> signal`, plus the risk manager's view per ticker.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalystSignals {
    #[serde(flatten)]
    pub analysts: BTreeMap<String, BTreeMap<String, AnalystSignal>>,
    pub risk_management_agent: BTreeMap<String, RiskAssessment>,
}

impl From<Vec<TickerReport>> for AnalysisResponse {
    fn from(reports: Vec<TickerReport>) -> Self {
        let mut out = AnalysisResponse::default();
        for report in reports {
            for (key, signal) in report.signals {
                out.analyst_signals
                    .analysts
                    .entry(key.agent_name())
                    .or_default()
                    .insert(report.ticker.clone(), signal);
            }
            out.analyst_signals
                .risk_management_agent
                .insert(report.ticker.clone(), report.risk);
            out.decisions.insert(report.ticker, report.decision);
        }
        out
    }
}
