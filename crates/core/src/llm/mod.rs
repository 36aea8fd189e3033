pub mod anthropic;
pub mod error;
pub mod json;
pub mod openai;

use anyhow::Context;
use std::sync::Arc;

use crate::config::Settings;
use crate::domain::contract::SignalDraft;

#[derive(Debug, Clone)]
pub struct SignalPrompt {
    pub model: String,
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAI,
}

impl Provider {
    /// Claude models go to Anthropic; everything else is assumed to speak the
    /// OpenAI chat completions protocol.
    pub fn for_model(model: &str) -> Self {
        if model.trim().to_ascii_lowercase().starts_with("claude") {
            Provider::Anthropic
        } else {
            Provider::OpenAI
        }
    }
}

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn generate_signal(&self, prompt: SignalPrompt) -> anyhow::Result<SignalDraft>;
}

/// Picks the client for a request's model name. A provider without an API key
/// is simply absent.
#[derive(Clone, Default)]
pub struct LlmRouter {
    openai: Option<Arc<dyn LlmClient>>,
    anthropic: Option<Arc<dyn LlmClient>>,
}

impl LlmRouter {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let openai = match settings.openai_api_key {
            Some(_) => Some(Arc::new(openai::OpenAiClient::from_settings(settings)?) as Arc<dyn LlmClient>),
            None => None,
        };
        let anthropic = match settings.anthropic_api_key {
            Some(_) => Some(
                Arc::new(anthropic::AnthropicClient::from_settings(settings)?) as Arc<dyn LlmClient>,
            ),
            None => None,
        };

        if openai.is_none() && anthropic.is_none() {
            tracing::warn!("no LLM API key configured; every analyst evaluation will fail");
        }

        Ok(Self { openai, anthropic })
    }

    pub fn with_client(mut self, client: Arc<dyn LlmClient>) -> Self {
        match client.provider() {
            Provider::OpenAI => self.openai = Some(client),
            Provider::Anthropic => self.anthropic = Some(client),
        }
        self
    }

    pub fn client_for(&self, model: &str) -> anyhow::Result<Arc<dyn LlmClient>> {
        match Provider::for_model(model) {
            Provider::OpenAI => self
                .openai
                .clone()
                .with_context(|| format!("OPENAI_API_KEY is required for model {model}")),
            Provider::Anthropic => self
                .anthropic
                .clone()
                .with_context(|| format!("ANTHROPIC_API_KEY is required for model {model}")),
        }
    }
}

pub(crate) fn repair_prompt(previous_output: &str) -> String {
    format!(
        "Your previous message was NOT valid JSON for the required schema.\n\n\
TASK: Output ONLY a single JSON object with exactly these keys:\n\
{{\"signal\": \"bullish\" | \"bearish\" | \"neutral\", \"confidence\": number 0-100, \"reasoning\": \"string\"}}\n\
- Do NOT include any markdown, prose, or code fences.\n\
- Use double quotes for all JSON strings.\n\n\
INVALID OUTPUT (for reference only; DO NOT copy verbatim):\n{previous_output}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::Signal;

    struct Canned(Provider);

    #[async_trait::async_trait]
    impl LlmClient for Canned {
        fn provider(&self) -> Provider {
            self.0
        }

        async fn generate_signal(&self, _prompt: SignalPrompt) -> anyhow::Result<SignalDraft> {
            Ok(SignalDraft {
                signal: Signal::Neutral,
                confidence: 1.0,
                reasoning: "canned".to_string(),
            })
        }
    }

    #[test]
    fn routes_by_model_prefix() {
        assert_eq!(Provider::for_model("gpt-4o"), Provider::OpenAI);
        assert_eq!(Provider::for_model("Claude-3-5-sonnet-latest"), Provider::Anthropic);
        assert_eq!(Provider::for_model("o3-mini"), Provider::OpenAI);
    }

    #[test]
    fn missing_client_names_the_key() {
        let router = LlmRouter::default().with_client(Arc::new(Canned(Provider::OpenAI)));
        assert!(router.client_for("gpt-4o").is_ok());

        let err = router.client_for("claude-3-opus").err().unwrap();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }
}
