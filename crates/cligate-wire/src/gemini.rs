//! Google generateContent: inbound request conversion, `candidates`
//! envelopes and cumulative streams.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use cligate_core::chat::{
    ChatChunk, ChatMessage, ChatRequest, ChatResponse, ContentBlock, FinishReason, MessageContent,
    Role, ToolCall, Usage, WireFormat,
};
use cligate_core::{ids, GatewayError};

use crate::finish;
use crate::frame::Frame;
use crate::stream::StreamEncoder;

const GENERATE: &str = ":generateContent";
const STREAM_GENERATE: &str = ":streamGenerateContent";
const FALLBACK_TEMPERATURE: f64 = 0.7;

// ── Request ──

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(default)]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "user".into()
}

#[derive(Clone, Debug, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, alias = "inlineData")]
    pub inline_data: Option<InlineData>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default, alias = "mime_type")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub data: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub top_k: Option<u32>,
}

/// Split a `{model}:generateContent` / `{model}:streamGenerateContent` path
/// segment into the model name and the stream flag.
pub fn parse_model_action(action: &str) -> Option<(String, bool)> {
    if let Some(model) = action.strip_suffix(STREAM_GENERATE) {
        return Some((model.to_string(), true));
    }
    action
        .strip_suffix(GENERATE)
        .map(|model| (model.to_string(), false))
}

pub fn to_chat_request(req: GenerateContentRequest, model: &str, stream: bool) -> ChatRequest {
    let messages = req.contents.iter().filter_map(convert_content).collect();
    let config = req.generation_config.unwrap_or_default();

    let mut chat = ChatRequest::new(messages);
    chat.model = model.to_string();
    chat.stream = stream;
    chat.response_format = WireFormat::Gemini;
    // Zero counts as unset.
    chat.temperature = Some(
        config
            .temperature
            .filter(|t| *t != 0.0)
            .unwrap_or(FALLBACK_TEMPERATURE),
    );
    chat.max_tokens = config.max_output_tokens;
    if config.top_p.is_some() {
        chat.top_p = config.top_p;
    }
    chat
}

fn convert_content(content: &Content) -> Option<ChatMessage> {
    if content.parts.is_empty() {
        return None;
    }
    let role = if content.role == "model" {
        Role::Assistant
    } else {
        Role::User
    };

    let has_inline_data = content.parts.iter().any(|p| p.inline_data.is_some());
    if has_inline_data {
        let blocks = content
            .parts
            .iter()
            .filter_map(|part| match (&part.text, &part.inline_data) {
                (Some(text), _) if !text.is_empty() => Some(ContentBlock::text(text)),
                (_, Some(inline)) => Some(ContentBlock::image(format!(
                    "data:{};base64,{}",
                    inline.mime_type.as_deref().unwrap_or("image/jpeg"),
                    inline.data
                ))),
                _ => None,
            })
            .collect();
        return Some(ChatMessage::new(role, MessageContent::Blocks(blocks)));
    }

    let text = content
        .parts
        .iter()
        .filter_map(|p| p.text.as_deref().filter(|t| !t.is_empty()))
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then(|| ChatMessage::new(role, MessageContent::Text(text)))
}

// ── Response ──

fn usage_metadata(usage: Usage) -> Value {
    json!({
        "promptTokenCount": usage.prompt_tokens,
        "candidatesTokenCount": usage.completion_tokens,
        "totalTokenCount": usage.total_tokens,
    })
}

fn candidate(parts: Vec<Value>, finish_reason: Option<&str>) -> Value {
    json!({
        "content": {"parts": parts, "role": "model"},
        "finishReason": finish_reason,
        "index": 0,
    })
}

/// Whole generateContent response.
pub fn response(resp: &ChatResponse) -> Value {
    let mut parts = vec![json!({"text": resp.content})];
    for call in &resp.tool_calls {
        parts.push(json!({
            "functionCall": {"name": call.function.name, "args": call.function.arguments},
        }));
    }
    let reason = finish::to_gemini(resp.finish_reason.unwrap_or(FinishReason::Stop));
    json!({
        "candidates": [candidate(parts, Some(reason))],
        "usageMetadata": usage_metadata(resp.usage.unwrap_or_default()),
        "modelVersion": resp.model,
    })
}

/// Read a generateContent response back into the unified shape.
pub fn parse_response(v: &Value) -> ChatResponse {
    let candidate = &v["candidates"][0];
    let mut texts = Vec::new();
    let mut tool_calls = Vec::new();
    for part in candidate["content"]["parts"].as_array().into_iter().flatten() {
        if let Some(text) = part["text"].as_str() {
            texts.push(text);
        }
        if let Some(call) = part.get("functionCall") {
            tool_calls.push(ToolCall::function(
                ids::tool_call_id(),
                call["name"].as_str().unwrap_or_default(),
                call.get("args").cloned().unwrap_or_else(|| json!({})),
            ));
        }
    }

    let usage = v.get("usageMetadata").map(|u| {
        Usage::new(
            u["promptTokenCount"].as_u64().unwrap_or(0),
            u["candidatesTokenCount"].as_u64().unwrap_or(0),
        )
    });

    ChatResponse {
        content: texts.concat(),
        role: Role::Assistant,
        model: v["modelVersion"].as_str().unwrap_or_default().to_string(),
        session_id: None,
        finish_reason: candidate["finishReason"]
            .as_str()
            .map(|r| finish::from_gemini(r, !tool_calls.is_empty())),
        usage,
        tool_calls,
    }
}

/// Google-style error body.
pub fn error_body(code: u16, message: &str, status: &str) -> Value {
    json!({"error": {"code": code, "message": message, "status": status}})
}

// ── Stream ──

/// Streams one frame per delta and a closing frame holding the whole text.
pub struct GeminiStream {
    model: String,
    text: String,
    function_calls: Vec<Value>,
}

impl GeminiStream {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            text: String::new(),
            function_calls: Vec::new(),
        }
    }

    fn frame(&self, parts: Vec<Value>, finish_reason: Option<&str>, usage: Option<Usage>) -> Frame {
        let mut body = Map::new();
        body.insert("candidates".into(), json!([candidate(parts, finish_reason)]));
        if let Some(usage) = usage {
            body.insert("usageMetadata".into(), usage_metadata(usage));
        }
        body.insert("modelVersion".into(), json!(self.model));
        Frame::Data(Value::Object(body))
    }
}

impl StreamEncoder for GeminiStream {
    fn open(&mut self) -> Vec<Frame> {
        Vec::new()
    }

    fn chunk(&mut self, c: &ChatChunk) -> Vec<Frame> {
        let mut parts = Vec::new();
        if let Some(text) = c.content.as_deref().filter(|t| !t.is_empty()) {
            self.text.push_str(text);
            parts.push(json!({"text": text}));
        }
        for call in &c.tool_calls {
            let part = json!({
                "functionCall": {"name": call.function.name, "args": call.function.arguments},
            });
            self.function_calls.push(part.clone());
            parts.push(part);
        }
        if parts.is_empty() {
            return Vec::new();
        }
        vec![self.frame(parts, None, None)]
    }

    fn finish(&mut self, reason: FinishReason, usage: Option<Usage>) -> Vec<Frame> {
        let mut parts = vec![json!({"text": self.text})];
        parts.extend(self.function_calls.iter().cloned());
        vec![self.frame(
            parts,
            Some(finish::to_gemini(reason)),
            Some(usage.unwrap_or_default()),
        )]
    }

    fn error(&mut self, err: &GatewayError) -> Vec<Frame> {
        vec![Frame::Data(json!({"error": {"code": 500, "message": err.to_string()}}))]
    }
}
