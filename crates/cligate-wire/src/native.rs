//! Backend stdout → unified chat response.
//!
//! Backends are loosely specified, so each concept is looked up through an
//! ordered list of candidate keys. The first usable key wins.

use serde_json::{Map, Value};

use cligate_core::chat::{arguments, ChatResponse, FinishReason, Role, ToolCall, Usage};
use cligate_core::ids;

/// Keys that may hold the assistant text.
pub const CONTENT_KEYS: [&str; 3] = ["content", "text", "response"];
/// Keys that may hold prompt-side token counts.
pub const PROMPT_TOKEN_KEYS: [&str; 2] = ["input_tokens", "prompt_tokens"];
/// Keys that may hold completion-side token counts.
pub const COMPLETION_TOKEN_KEYS: [&str; 2] = ["output_tokens", "completion_tokens"];
/// Keys that may hold a tool call list.
pub const TOOL_CALL_KEYS: [&str; 2] = ["tool_calls", "tools"];

/// Parsed backend output. Plain text is a normal outcome, not an error.
#[derive(Clone, Debug, PartialEq)]
pub enum NativeOutput {
    Structured(Map<String, Value>),
    Raw(String),
}

impl NativeOutput {
    pub fn parse(stdout: &str) -> Self {
        match serde_json::from_str::<Value>(stdout) {
            Ok(Value::Object(map)) => Self::Structured(map),
            Ok(Value::String(text)) => Self::Raw(text),
            _ => Self::Raw(stdout.trim_end_matches(['\n', '\r']).to_string()),
        }
    }

    pub fn content(&self) -> String {
        match self {
            Self::Raw(text) => text.clone(),
            Self::Structured(map) => CONTENT_KEYS
                .iter()
                .filter_map(|key| map.get(*key).and_then(text_of))
                .find(|text| !text.is_empty())
                .unwrap_or_default(),
        }
    }

    pub fn finish_reason(&self) -> FinishReason {
        match self {
            Self::Structured(map) => map
                .get("finish_reason")
                .and_then(Value::as_str)
                .map(FinishReason::parse)
                .unwrap_or(FinishReason::Stop),
            Self::Raw(_) => FinishReason::Stop,
        }
    }

    pub fn usage(&self) -> Option<Usage> {
        let Self::Structured(map) = self else {
            return None;
        };
        let usage = map.get("usage")?.as_object()?;
        let prompt = first_count(usage, &PROMPT_TOKEN_KEYS);
        let completion = first_count(usage, &COMPLETION_TOKEN_KEYS);
        Some(Usage::new(prompt, completion))
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        let Self::Structured(map) = self else {
            return Vec::new();
        };
        let Some(raw) = TOOL_CALL_KEYS
            .iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_array))
            .find(|calls| !calls.is_empty())
        else {
            return Vec::new();
        };
        raw.iter().filter_map(tool_call_of).collect()
    }

    /// Whole unified response for `model`.
    pub fn to_chat_response(&self, model: &str) -> ChatResponse {
        ChatResponse {
            content: self.content(),
            role: Role::Assistant,
            model: model.to_string(),
            session_id: None,
            finish_reason: Some(self.finish_reason()),
            usage: self.usage(),
            tool_calls: self.tool_calls(),
        }
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<&str> = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.as_str()),
                    Value::Object(o) => o.get("text").and_then(Value::as_str),
                    _ => None,
                })
                .collect();
            Some(parts.join("\n"))
        }
        _ => None,
    }
}

fn first_count(map: &Map<String, Value>, keys: &[&str]) -> u64 {
    keys.iter()
        .find_map(|key| map.get(*key).and_then(Value::as_u64))
        .unwrap_or(0)
}

fn tool_call_of(raw: &Value) -> Option<ToolCall> {
    let obj = raw.as_object()?;
    let function = obj.get("function").and_then(Value::as_object);

    let name = obj
        .get("name")
        .or_else(|| function.and_then(|f| f.get("name")))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let args = obj
        .get("arguments")
        .or_else(|| function.and_then(|f| f.get("arguments")))
        .cloned()
        .unwrap_or(Value::Null);
    let id = obj
        .get("id")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(ids::tool_call_id);

    let mut call = ToolCall::function(id, name, arguments::decode(args));
    if let Some(kind) = obj.get("type").and_then(Value::as_str) {
        call.kind = kind.to_string();
    }
    Some(call)
}
