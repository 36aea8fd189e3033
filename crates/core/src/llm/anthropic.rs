use crate::config::Settings;
use crate::domain::contract::{LlmSignalOutput, SignalDraft};
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::json;
use crate::llm::{repair_prompt, LlmClient, Provider, SignalPrompt};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

const TOOL_NAME_EMIT_SIGNAL: &str = "emit_signal";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let max_tokens = std::env::var("LLM_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

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
            max_tokens,
        })
    }

    async fn create_message(
        &self,
        req: CreateMessageRequest,
    ) -> anyhow::Result<(serde_json::Value, CreateMessageResponse)> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let model = req.model.clone();
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Anthropic response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            return Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "http",
                model,
                detail: format!("status={status}"),
                raw_output: Some(text),
                raw_response_json,
            }
            .into());
        }

        let raw_json = serde_json::from_str::<serde_json::Value>(&text)
            .with_context(|| format!("failed to parse Anthropic response JSON: {text}"))?;
        let parsed = serde_json::from_value::<CreateMessageResponse>(raw_json.clone())
            .context("failed to decode Anthropic response into CreateMessageResponse")?;
        Ok((raw_json, parsed))
    }

    fn tools() -> Vec<Tool> {
        let schema = serde_json::json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["signal", "confidence", "reasoning"],
            "properties": {
                "signal": {"type": "string", "enum": ["bullish", "bearish", "neutral"]},
                "confidence": {"type": "number", "minimum": 0, "maximum": 100},
                "reasoning": {"type": "string"}
            }
        });

        vec![Tool {
            name: TOOL_NAME_EMIT_SIGNAL,
            description: "Emit the analyst's trading signal as structured JSON",
            input_schema: schema,
        }]
    }

    fn tool_choice() -> ToolChoice {
        ToolChoice::Tool {
            name: TOOL_NAME_EMIT_SIGNAL,
        }
    }

    fn request(&self, prompt: &SignalPrompt, content: String) -> CreateMessageRequest {
        CreateMessageRequest {
            model: prompt.model.clone(),
            max_tokens: self.max_tokens,
            system: Some(prompt.system.clone()),
            messages: vec![Message {
                role: "user",
                content,
            }],
            tools: Some(Self::tools()),
            tool_choice: Some(Self::tool_choice()),
        }
    }

    fn response_text(res: &CreateMessageResponse) -> String {
        let mut out = String::new();
        for block in &res.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    fn response_tool_signal(res: &CreateMessageResponse) -> anyhow::Result<Option<LlmSignalOutput>> {
        for block in &res.content {
            if let ContentBlock::ToolUse { name, input, .. } = block {
                if name == TOOL_NAME_EMIT_SIGNAL {
                    let parsed = serde_json::from_value::<LlmSignalOutput>(input.clone())
                        .context("failed to decode tool_use.input into LlmSignalOutput")?;
                    return Ok(Some(parsed));
                }
            }
        }
        Ok(None)
    }

    fn draft_from_response(res: &CreateMessageResponse) -> anyhow::Result<SignalDraft> {
        if let Some(tool_signal) = Self::response_tool_signal(res)? {
            return tool_signal.validate_and_into_draft();
        }
        json::parse_signal(&Self::response_text(res))
    }
}

#[async_trait::async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn generate_signal(&self, prompt: SignalPrompt) -> anyhow::Result<SignalDraft> {
        let (raw_json, res) = self
            .create_message(self.request(&prompt, prompt.user.clone()))
            .await?;

        let first_err = match Self::draft_from_response(&res) {
            Ok(draft) => return Ok(draft),
            Err(err) => err,
        };

        tracing::warn!(model = %prompt.model, error = %first_err, "Anthropic output invalid; retrying with repair prompt");
        let previous = Self::response_text(&res);
        let previous = if previous.is_empty() {
            raw_json.to_string()
        } else {
            previous
        };

        let (repair_raw_json, repair_res) = self
            .create_message(self.request(&prompt, repair_prompt(&previous)))
            .await?;
        Self::draft_from_response(&repair_res).map_err(|err| {
            LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "parse_after_repair",
                model: prompt.model.clone(),
                detail: format!("final_error={err}"),
                raw_output: Some(Self::response_text(&repair_res)),
                raw_response_json: Some(repair_raw_json),
            }
            .into()
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ToolChoice {
    #[serde(rename = "tool")]
    Tool { name: &'static str },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    #[serde(other)]
    Unknown,
}
