//! OpenAI chat-completions envelopes.

use serde_json::{json, Value};

use cligate_core::chat::{
    arguments, ChatChunk, ChatResponse, FinishReason, Role, ToolCall, Usage,
};
use cligate_core::{ids, GatewayError};

use crate::frame::Frame;
use crate::stream::StreamEncoder;

/// Whole `chat.completion` object.
pub fn completion(resp: &ChatResponse, id: &str, created: i64) -> Value {
    let mut message = json!({
        "role": "assistant",
        "content": resp.content,
    });
    if !resp.tool_calls.is_empty() {
        message["tool_calls"] = convert_tool_calls(&resp.tool_calls, false);
    }

    let finish = resp.finish_reason.unwrap_or(FinishReason::Stop);
    json!({
        "id": id,
        "object": "chat.completion",
        "created": created,
        "model": resp.model,
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": finish.as_str(),
        }],
        "usage": convert_usage(resp.usage.unwrap_or_default()),
    })
}

/// One `chat.completion.chunk` object.
pub fn chunk(id: &str, model: &str, created: i64, delta: Value, finish_reason: Option<&str>) -> Value {
    json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [{
            "index": 0,
            "delta": delta,
            "finish_reason": finish_reason,
        }],
    })
}

/// Delta object for a unified chunk. Absent fields are omitted.
pub fn convert_delta(c: &ChatChunk) -> Value {
    let mut delta = json!({});
    if let Some(role) = c.role {
        delta["role"] = json!(role.as_str());
    }
    if let Some(content) = &c.content {
        delta["content"] = json!(content);
    }
    if !c.tool_calls.is_empty() {
        delta["tool_calls"] = convert_tool_calls(&c.tool_calls, true);
    }
    delta
}

fn convert_tool_calls(calls: &[ToolCall], indexed: bool) -> Value {
    let calls: Vec<Value> = calls
        .iter()
        .enumerate()
        .map(|(i, call)| {
            let mut v = json!({
                "id": call.id,
                "type": call.kind,
                "function": {
                    "name": call.function.name,
                    "arguments": call.arguments_json(),
                },
            });
            if indexed {
                v["index"] = json!(i);
            }
            v
        })
        .collect();
    json!(calls)
}

fn convert_usage(usage: Usage) -> Value {
    json!({
        "prompt_tokens": usage.prompt_tokens,
        "completion_tokens": usage.completion_tokens,
        "total_tokens": usage.total_tokens,
    })
}

/// Read a `chat.completion` object back into the unified shape.
pub fn parse_completion(v: &Value) -> ChatResponse {
    let choice = &v["choices"][0];
    let message = &choice["message"];

    let tool_calls = message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .map(|call| {
                    ToolCall::function(
                        call["id"].as_str().map(String::from).unwrap_or_else(ids::tool_call_id),
                        call["function"]["name"].as_str().unwrap_or_default(),
                        arguments::decode(call["function"]["arguments"].clone()),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    let usage = v.get("usage").map(|u| {
        Usage::new(
            u["prompt_tokens"].as_u64().unwrap_or(0),
            u["completion_tokens"].as_u64().unwrap_or(0),
        )
    });

    ChatResponse {
        content: message["content"].as_str().unwrap_or_default().to_string(),
        role: Role::Assistant,
        model: v["model"].as_str().unwrap_or_default().to_string(),
        session_id: None,
        finish_reason: choice["finish_reason"].as_str().map(FinishReason::parse),
        usage,
        tool_calls,
    }
}

/// Streams `chat.completion.chunk` frames: a role-only opener, one chunk per
/// delta, and an empty-delta closer carrying the finish reason.
pub struct OpenAiStream {
    id: String,
    model: String,
    created: i64,
}

impl OpenAiStream {
    pub fn new(model: &str) -> Self {
        Self::with_id(ids::completion_id(), model)
    }

    pub fn with_id(id: impl Into<String>, model: &str) -> Self {
        Self {
            id: id.into(),
            model: model.to_string(),
            created: crate::unix_now(),
        }
    }

    fn frame(&self, delta: Value, finish_reason: Option<&str>) -> Frame {
        Frame::Data(chunk(&self.id, &self.model, self.created, delta, finish_reason))
    }
}

impl StreamEncoder for OpenAiStream {
    fn open(&mut self) -> Vec<Frame> {
        vec![self.frame(convert_delta(&ChatChunk::role(Role::Assistant)), None)]
    }

    fn chunk(&mut self, c: &ChatChunk) -> Vec<Frame> {
        let empty_text = c.content.as_deref().map_or(true, str::is_empty);
        if empty_text && c.tool_calls.is_empty() && c.role.is_none() {
            return Vec::new();
        }
        vec![self.frame(convert_delta(c), c.finish_reason.map(|r| r.as_str()))]
    }

    fn finish(&mut self, reason: FinishReason, _usage: Option<Usage>) -> Vec<Frame> {
        vec![self.frame(json!({}), Some(reason.as_str()))]
    }

    fn error(&mut self, err: &GatewayError) -> Vec<Frame> {
        vec![self.frame(
            json!({"content": format!("[Error: {err}]")}),
            Some(FinishReason::Error.as_str()),
        )]
    }
}
