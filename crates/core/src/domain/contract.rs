use anyhow::ensure;
use serde::{Deserialize, Serialize};

use crate::domain::signal::{clamp_confidence, Signal};

/// Shape an LLM is asked to emit for a single analyst signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSignalOutput {
    pub signal: String,
    pub confidence: f64,
    pub reasoning: String,
}

/// Validated LLM output, not yet bound to an analyst or ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDraft {
    pub signal: Signal,
    pub confidence: f64,
    pub reasoning: String,
}

impl LlmSignalOutput {
    pub fn validate_and_into_draft(self) -> anyhow::Result<SignalDraft> {
        let signal = self
            .signal
            .parse::<Signal>()
            .map_err(anyhow::Error::msg)?;

        ensure!(
            self.confidence.is_finite(),
            "confidence must be a finite number (got {})",
            self.confidence
        );

        let reasoning = self.reasoning.trim().to_string();
        ensure!(!reasoning.is_empty(), "reasoning must be non-empty");

        Ok(SignalDraft {
            signal,
            confidence: clamp_confidence(self.confidence),
            reasoning,
        })
    }
}
