use crate::config::Settings;
use crate::domain::contract::SignalDraft;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::json;
use crate::llm::{repair_prompt, LlmClient, Provider, SignalPrompt};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Client for the OpenAI chat completions protocol. Also works against
/// compatible gateways via `OPENAI_BASE_URL`.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_openai_api_key()?.to_string();
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let timeout_secs = std::env::var("LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
        })
    }

    fn url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/chat/completions")
        } else {
            format!("{base}/v1/chat/completions")
        }
    }

    async fn chat(&self, req: ChatRequest) -> anyhow::Result<(serde_json::Value, String)> {
        let model = req.model.clone();
        let res = self
            .http
            .post(self.url())
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("OpenAI request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read OpenAI response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            return Err(LlmDiagnosticsError {
                provider: Provider::OpenAI,
                stage: "http",
                model,
                detail: format!("status={status}"),
                raw_output: Some(text),
                raw_response_json,
            }
            .into());
        }

        let raw_json = serde_json::from_str::<serde_json::Value>(&text)
            .with_context(|| format!("failed to parse OpenAI response JSON: {text}"))?;
        let parsed = serde_json::from_value::<ChatResponse>(raw_json.clone())
            .context("failed to decode OpenAI response into ChatResponse")?;
        Ok((raw_json, parsed.content()))
    }

    fn request(prompt: &SignalPrompt, user: String) -> ChatRequest {
        ChatRequest {
            model: prompt.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompt.system.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for OpenAiClient {
    fn provider(&self) -> Provider {
        Provider::OpenAI
    }

    async fn generate_signal(&self, prompt: SignalPrompt) -> anyhow::Result<SignalDraft> {
        let (_raw, text) = self
            .chat(Self::request(&prompt, prompt.user.clone()))
            .await?;

        let first_err = match json::parse_signal(&text) {
            Ok(draft) => return Ok(draft),
            Err(err) => err,
        };

        tracing::warn!(model = %prompt.model, error = %first_err, "OpenAI output invalid; retrying with repair prompt");
        let (repair_raw_json, repair_text) = self
            .chat(Self::request(&prompt, repair_prompt(&text)))
            .await?;
        json::parse_signal(&repair_text).map_err(|err| {
            LlmDiagnosticsError {
                provider: Provider::OpenAI,
                stage: "parse_after_repair",
                model: prompt.model.clone(),
                detail: format!("final_error={err}"),
                raw_output: Some(repair_text.clone()),
                raw_response_json: Some(repair_raw_json),
            }
            .into()
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    fn content(&self) -> String {
        self.choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default()
    }
}
