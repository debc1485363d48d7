use crate::llm::{ChatMessage, ChatRequest, LlmClient, Role};
use serde::Deserialize;
use serde_json::Value;

pub const MAX_MESSAGE_CHARS: usize = 4000;
const TEMPERATURE: f32 = 0.3;
const FALLBACK_REPLY: &str = "I could not generate a response.";

const SYSTEM_PROMPT: &str = "You are a one-on-one sentiment trading advisor for a demo platform.
Keep responses concise and practical.
Always align recommendations with these key objectives:
1) Automate sentiment-driven trading decisions
2) Monitor market sentiment in real-time
3) Adjust portfolio risk dynamically
4) Demonstrate agentic trading logic

Always consider these requirements:
- News and social media sentiment analysis
- Mock portfolio management
- Risk level adjustment
- Buy/sell order drafting logic

Drafted orders are never executed automatically; the user approves or rejects each one.
Outputs are probabilistic and not financial advice.";

/// A message as received from a client. Anything can arrive here, so every field is loose.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<Value>,
}

/// Keeps user/assistant turns with truthy content (no `null`, `false`, `0` or `""`),
/// truncated to [`MAX_MESSAGE_CHARS`].
pub fn sanitize(messages: Vec<IncomingMessage>) -> Vec<ChatMessage> {
    messages
        .into_iter()
        .filter_map(|m| {
            let role = match m.role.as_deref() {
                Some("user") => Role::User,
                Some("assistant") => Role::Assistant,
                _ => return None,
            };
            let content = match m.content? {
                Value::Null | Value::Bool(false) => return None,
                Value::Number(n) if n.as_f64().map_or(true, |v| v == 0.0) => return None,
                Value::String(s) => s,
                other => other.to_string(),
            };
            if content.is_empty() {
                return None;
            }
            Some(ChatMessage {
                role,
                content: content.chars().take(MAX_MESSAGE_CHARS).collect(),
            })
        })
        .collect()
}

pub async fn chat(llm: &dyn LlmClient, messages: Vec<IncomingMessage>) -> anyhow::Result<String> {
    let messages = sanitize(messages);
    let req = ChatRequest {
        system: Some(SYSTEM_PROMPT.to_string()),
        messages,
        temperature: Some(TEMPERATURE),
    };

    let reply = llm.complete(req).await?;
    let reply = reply.trim();
    if reply.is_empty() {
        return Ok(FALLBACK_REPLY.to_string());
    }
    Ok(reply.to_string())
}
