//! OpenAI-compatible request/response shapes spoken by the gateway.
//!
//! The body is built from [`ChatRequest`] without leaking internal message
//! fields (`id`, `tokens`, `created_at`).

use localai_core::{ChatMessage, ChatRequest};
use serde::Deserialize;
use serde_json::{json, Value};

/// Convert transcript messages to the wire `messages` array.
pub fn messages_to_openai_compat_json(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let mut msg = json!({
                "role": m.role.as_str(),
                "content": m.content,
            });

            if !m.tool_calls.is_empty() {
                msg["tool_calls"] = json!(m.tool_calls);
            }

            msg
        })
        .collect()
}

/// Build the streaming chat-completion body for `request`.
pub fn build_chat_body(request: &ChatRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "messages": messages_to_openai_compat_json(&request.messages),
        "stream": request.stream,
    });

    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }

    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }

    if let Some(persona) = &request.persona {
        body["persona"] = json!(persona);
    }

    body
}

#[derive(Debug, Deserialize)]
pub struct ModelsResponse {
    #[serde(default)]
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ModelEntry {
    pub id: String,
}

impl ModelsResponse {
    pub fn into_ids(self) -> Vec<String> {
        self.data.into_iter().map(|m| m.id).collect()
    }
}
