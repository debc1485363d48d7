use crate::domain::contract::{LlmSentimentAnalysis, LlmTradeDraft};
use anyhow::Context;

fn strip_fences(trimmed: &str) -> Option<String> {
    if !trimmed.starts_with("```") {
        return None;
    }
    // Remove Markdown fences (```json ... ``` or ``` ... ```).
    let mut inner = trimmed;
    if let Some(after_first) = inner.splitn(2, '\n').nth(1) {
        inner = after_first;
    }
    if let Some(end) = inner.rfind("```") {
        inner = &inner[..end];
    }
    Some(inner.trim().to_string())
}

fn extract_between(text: &str, open: char, close: char) -> Option<String> {
    let trimmed = text.trim();
    let source = strip_fences(trimmed);
    let body = source.as_deref().unwrap_or(trimmed);

    // Best-effort extraction: first opener to last closer.
    let start = body.find(open)?;
    let end = body.rfind(close)?;
    if end <= start {
        return None;
    }
    Some(body[start..=end].trim().to_string())
}

pub fn extract_json_object(text: &str) -> Option<String> {
    extract_between(text, '{', '}')
}

pub fn extract_json_array(text: &str) -> Option<String> {
    extract_between(text, '[', ']')
}

pub fn parse_sentiment_analysis(text: &str) -> anyhow::Result<LlmSentimentAnalysis> {
    let json_str = extract_json_object(text).unwrap_or_else(|| text.trim().to_string());
    serde_json::from_str::<LlmSentimentAnalysis>(&json_str)
        .with_context(|| format!("LLM output is not a sentiment analysis object: {json_str}"))
}

/// Parses an array of trade drafts. Entries that do not match the draft shape are dropped
/// individually; only a response with no array at all is an error.
pub fn parse_trade_drafts(text: &str) -> anyhow::Result<Vec<LlmTradeDraft>> {
    let json_str = extract_json_array(text).unwrap_or_else(|| text.trim().to_string());
    let values = serde_json::from_str::<Vec<serde_json::Value>>(&json_str)
        .with_context(|| format!("LLM output is not a JSON array: {json_str}"))?;

    let mut out = Vec::with_capacity(values.len());
    for value in values {
        match serde_json::from_value::<LlmTradeDraft>(value) {
            Ok(draft) => out.push(draft),
            Err(err) => tracing::warn!(error = %err, "dropping malformed trade draft"),
        }
    }
    Ok(out)
}
