use crate::domain::contract::{LlmSignalOutput, SignalDraft};
use anyhow::Context;

pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        // Remove Markdown fences (```json ... ``` or ``` ... ```).
        let mut inner = trimmed;
        if let Some(after_first) = inner.splitn(2, '\n').nth(1) {
            inner = after_first;
        }
        if let Some(end) = inner.rfind("```") {
            inner = &inner[..end];
        }
        return Some(inner.trim().to_string());
    }

    // Best-effort extraction: first '{' to last '}'.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

pub fn parse_signal(text: &str) -> anyhow::Result<SignalDraft> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    let parsed = serde_json::from_str::<LlmSignalOutput>(&json_str)
        .with_context(|| format!("LLM output is not valid JSON for signal schema: {json_str}"))?;
    parsed.validate_and_into_draft()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::Signal;

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let body = "{\"a\":1}";
        let fenced = format!("```json\n{body}\n```\n");
        assert_eq!(extract_json(&fenced), Some(body.to_string()));
    }

    #[test]
    fn extract_json_falls_back_to_braces() {
        let s = "prefix {\"a\":1} suffix";
        assert_eq!(extract_json(s), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn parse_signal_accepts_prose_wrapped_json() {
        let text = "Here is my view:\n{\"signal\": \"bearish\", \"confidence\": 80, \"reasoning\": \"Trades far above Graham Number.\"}\nThanks.";
        let draft = parse_signal(text).unwrap();
        assert_eq!(draft.signal, Signal::Bearish);
        assert_eq!(draft.confidence, 80.0);
    }

    #[test]
    fn parse_signal_rejects_missing_keys() {
        assert!(parse_signal("{\"signal\": \"bullish\"}").is_err());
        assert!(parse_signal("no json here").is_err());
    }
}
