use std::sync::Arc;
use std::time::Duration;

use crate::analysts::{AnalystKey, EvaluationInput, SignalProvider};
use crate::domain::signal::AnalystSignal;
use crate::error::ProviderError;
use crate::llm::{LlmRouter, SignalPrompt};

/// Analyst that argues from its persona and asks the request's model for a signal.
#[derive(Clone)]
pub struct LlmAnalyst {
    key: AnalystKey,
    llm: Arc<LlmRouter>,
    timeout: Duration,
}

impl LlmAnalyst {
    pub fn new(key: AnalystKey, llm: Arc<LlmRouter>, timeout: Duration) -> Self {
        Self { key, llm, timeout }
    }

    fn system_prompt(&self) -> String {
        let mut lines = vec![format!(
            "You are a {} AI agent making investment decisions.",
            self.key.display_name()
        )];
        lines.push("Principles:".to_string());
        lines.extend(self.key.persona().iter().map(|p| format!("- {p}")));
        lines.extend(
            [
                "Return ONLY valid JSON. Do not wrap in markdown. Do not include any extra keys.",
                "Output schema:",
                "{",
                "  \"signal\": \"bullish\" | \"bearish\" | \"neutral\",",
                "  \"confidence\": number between 0 and 100,",
                "  \"reasoning\": \"string\"",
                "}",
            ]
            .map(String::from),
        );
        lines.join("\n")
    }

    fn user_prompt(input: &EvaluationInput) -> String {
        let market = match &input.market {
            Some(m) => format!(
                "Price history {} to {} ({} daily bars): first close {:.2}, last close {:.2}, \
change {:+.2}%, high {:.2}, low {:.2}.",
                m.first_date, m.last_date, m.bars, m.first_close, m.last_close, m.change_pct, m.high, m.low
            ),
            None => "No price history is available for this window.".to_string(),
        };
        format!(
            "Task: Give a trading signal for {} over {} to {}.\n\n{}\n\n\
Reply with the JSON object only.",
            input.ticker, input.start_date, input.end_date, market
        )
    }
}

#[async_trait::async_trait]
impl SignalProvider for LlmAnalyst {
    fn key(&self) -> AnalystKey {
        self.key
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn evaluate(&self, input: &EvaluationInput) -> Result<AnalystSignal, ProviderError> {
        let client = self
            .llm
            .client_for(&input.model_name)
            .map_err(ProviderError::ModelInvocation)?;

        let draft = client
            .generate_signal(SignalPrompt {
                model: input.model_name.clone(),
                system: self.system_prompt(),
                user: Self::user_prompt(input),
            })
            .await
            .map_err(ProviderError::ModelInvocation)?;

        Ok(AnalystSignal::new(
            self.key,
            &input.ticker,
            draft.signal,
            draft.confidence,
            draft.reasoning,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::contract::SignalDraft;
    use crate::domain::signal::Signal;
    use crate::llm::{LlmClient, Provider};
    use crate::market::PriceSummary;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Canned {
        prompts: Mutex<Vec<SignalPrompt>>,
    }

    #[async_trait::async_trait]
    impl LlmClient for Canned {
        fn provider(&self) -> Provider {
            Provider::OpenAI
        }

        async fn generate_signal(&self, prompt: SignalPrompt) -> anyhow::Result<SignalDraft> {
            self.prompts.lock().unwrap().push(prompt);
            Ok(SignalDraft {
                signal: Signal::Bearish,
                confidence: 80.0,
                reasoning: "Trading well above Graham Number.".to_string(),
            })
        }
    }

    fn input(model: &str, market: Option<PriceSummary>) -> EvaluationInput {
        EvaluationInput {
            ticker: "TSLA".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            model_name: model.to_string(),
            market,
        }
    }

    #[tokio::test]
    async fn binds_model_output_to_analyst_and_ticker() {
        let client = Arc::new(Canned::default());
        let router = LlmRouter::default().with_client(client.clone());
        let analyst = LlmAnalyst::new(AnalystKey::BenGraham, Arc::new(router), Duration::from_secs(5));

        let summary = PriceSummary {
            first_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            last_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            first_close: 248.42,
            last_close: 202.64,
            change_pct: -18.43,
            high: 251.25,
            low: 180.06,
            bars: 42,
        };
        let signal = analyst.evaluate(&input("gpt-4o", Some(summary))).await.unwrap();
        assert_eq!(signal.analyst, AnalystKey::BenGraham);
        assert_eq!(signal.ticker, "TSLA");
        assert_eq!(signal.signal, Signal::Bearish);
        assert_eq!(signal.confidence, 80.0);

        let prompts = client.prompts.lock().unwrap();
        assert_eq!(prompts[0].model, "gpt-4o");
        assert!(prompts[0].system.contains("Ben Graham"));
        assert!(prompts[0].system.contains("margin of safety"));
        assert!(prompts[0].user.contains("last close 202.64"));
    }

    #[tokio::test]
    async fn missing_provider_key_is_a_model_failure() {
        let analyst = LlmAnalyst::new(
            AnalystKey::Wsb,
            Arc::new(LlmRouter::default()),
            Duration::from_secs(5),
        );
        let err = analyst.evaluate(&input("claude-3-5-sonnet-latest", None)).await.unwrap_err();
        assert!(matches!(err, ProviderError::ModelInvocation(_)));
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }
}
