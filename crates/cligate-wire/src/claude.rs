//! Anthropic Messages API: inbound request conversion, outbound `message`
//! envelopes and named-event streams.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use cligate_core::chat::{
    ChatChunk, ChatMessage, ChatRequest, ChatResponse, ContentBlock, FinishReason, FunctionTool,
    MessageContent, Role, ToolCall, ToolChoice, ToolChoiceMode, Usage, WireFormat,
};
use cligate_core::{ids, GatewayError};

use crate::finish;
use crate::frame::Frame;
use crate::stream::StreamEncoder;

/// Replacement system prompt used when prompt optimization is enabled.
pub const CONCISE_SYSTEM_PROMPT: &str = "You are an AI coding assistant.

Your role is to behave like a concise, reliable CLI-based coding helper,
without assuming any built-in tools.

Core principles:
- Focus on correctness and practical usefulness.
- Prefer clear, minimal explanations over verbosity.
- Do not speculate about unavailable tools, files, or environment state.
- Only rely on information explicitly provided by the user.

When answering:
- If the user asks for code, provide complete, runnable code snippets.
- If the user asks for debugging, reason step-by-step but keep the output concise.
- If information is missing, ask a targeted clarifying question instead of guessing.
- If a request is ambiguous, state the ambiguity briefly and propose safe assumptions.

Formatting rules:
- Use Markdown when appropriate.
- Use fenced code blocks for code.
- Do NOT invent tool calls or system capabilities.
- Do NOT mention system prompts, policies, or internal instructions.

Tone:
- Professional, calm, and precise.
- No emojis, no roleplay, no unnecessary disclaimers.";

// ── Request ──

#[derive(Clone, Debug, Deserialize)]
pub struct MessagesRequest {
    pub model: String,
    pub messages: Vec<InboundMessage>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub system: Option<SystemPrompt>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub tool_choice: Option<Value>,
}

fn default_max_tokens() -> u32 {
    4096
}

#[derive(Clone, Debug, Deserialize)]
pub struct InboundMessage {
    pub role: String,
    #[serde(default)]
    pub content: Value,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<Value>),
}

impl SystemPrompt {
    /// Text blocks joined with newlines. `None` when nothing textual remains.
    pub fn text(&self) -> Option<String> {
        match self {
            Self::Text(t) if t.is_empty() => None,
            Self::Text(t) => Some(t.clone()),
            Self::Blocks(blocks) => {
                let texts: Vec<&str> = blocks
                    .iter()
                    .filter(|b| b["type"] == "text")
                    .map(|b| b["text"].as_str().unwrap_or_default())
                    .collect();
                (!texts.is_empty()).then(|| texts.join("\n"))
            }
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ConvertOptions {
    pub optimize_system_prompt: bool,
}

/// Re-express a Messages request as a unified chat request.
pub fn to_chat_request(req: MessagesRequest, options: ConvertOptions) -> ChatRequest {
    let mut messages = Vec::new();

    if let Some(system) = req.system.as_ref().and_then(SystemPrompt::text) {
        let prompt = if options.optimize_system_prompt {
            info!(
                original_bytes = system.len(),
                optimized_bytes = CONCISE_SYSTEM_PROMPT.len(),
                "substituting concise system prompt"
            );
            CONCISE_SYSTEM_PROMPT.to_string()
        } else {
            system
        };
        messages.push(ChatMessage::system(prompt));
    }

    for msg in &req.messages {
        let role = match msg.role.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => continue,
        };
        messages.extend(convert_message(role, &msg.content));
    }

    let tools: Vec<FunctionTool> = req
        .tools
        .iter()
        .map(|t| FunctionTool::new(&t.name, &t.description, t.input_schema.clone()))
        .collect();
    let tool_choice = if tools.is_empty() {
        None
    } else {
        req.tool_choice.as_ref().map(convert_tool_choice)
    };

    let mut chat = ChatRequest::new(messages);
    chat.model = req.model;
    chat.stream = req.stream;
    chat.response_format = WireFormat::Claude;
    chat.max_tokens = Some(req.max_tokens);
    chat.temperature = req.temperature;
    chat.top_p = req.top_p;
    chat.include_tools = !tools.is_empty();
    chat.tools = tools;
    chat.tool_choice = tool_choice;
    chat
}

fn convert_message(role: Role, content: &Value) -> Vec<ChatMessage> {
    let blocks = match content {
        Value::String(text) => return vec![ChatMessage::new(role, MessageContent::Text(text.clone()))],
        Value::Array(blocks) => blocks,
        _ => return Vec::new(),
    };

    let mut parts = Vec::new();
    let mut tool_calls = Vec::new();
    let mut tool_results = Vec::new();

    for block in blocks {
        match block["type"].as_str() {
            Some("text") => {
                let text = block["text"].as_str().unwrap_or_default();
                if !text.is_empty() {
                    parts.push(ContentBlock::text(text));
                }
            }
            Some("image") => {
                if let Some(url) = image_data_uri(&block["source"]) {
                    parts.push(ContentBlock::image(url));
                }
            }
            Some("tool_use") => tool_calls.push(ToolCall::function(
                block["id"].as_str().unwrap_or_default(),
                block["name"].as_str().unwrap_or_default(),
                block.get("input").cloned().unwrap_or_else(|| json!({})),
            )),
            Some("tool_result") => tool_results.push(ChatMessage::tool_result(
                block["tool_use_id"].as_str().unwrap_or_default(),
                tool_result_text(&block["content"]),
            )),
            _ => {}
        }
    }

    if role == Role::Assistant && !tool_calls.is_empty() {
        let text = MessageContent::Blocks(parts).joined_text(" ");
        let mut msg = ChatMessage::new(role, MessageContent::Text(text));
        msg.tool_calls = tool_calls;
        vec![msg]
    } else if role == Role::User && !tool_results.is_empty() {
        tool_results
    } else if !parts.is_empty() {
        vec![ChatMessage::new(role, MessageContent::Blocks(parts))]
    } else {
        Vec::new()
    }
}

/// Base64 image source as a data URI. Sources already in URI form pass through.
fn image_data_uri(source: &Value) -> Option<String> {
    let data = source["data"].as_str().filter(|d| !d.is_empty())?;
    if data.starts_with("data:") {
        return Some(data.to_string());
    }
    let media_type = source["media_type"].as_str().unwrap_or("image/jpeg");
    Some(format!("data:{media_type};base64,{data}"))
}

fn tool_result_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|b| b["text"].as_str())
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn convert_tool_choice(choice: &Value) -> ToolChoice {
    match choice["type"].as_str() {
        Some("any") => ToolChoice::Mode(ToolChoiceMode::Required),
        Some("tool") => ToolChoice::named(choice["name"].as_str().unwrap_or_default()),
        _ => ToolChoice::Mode(ToolChoiceMode::Auto),
    }
}

// ── Response ──

/// Whole `message` object.
pub fn message(resp: &ChatResponse, id: &str) -> Value {
    let mut content: Vec<Value> = Vec::new();
    if !resp.content.is_empty() {
        content.push(json!({"type": "text", "text": resp.content}));
    }
    for call in &resp.tool_calls {
        content.push(json!({
            "type": "tool_use",
            "id": call.id,
            "name": call.function.name,
            "input": tool_input(call),
        }));
    }
    if content.is_empty() {
        content.push(json!({"type": "text", "text": ""}));
    }

    let usage = resp.usage.unwrap_or_default();
    json!({
        "id": id,
        "type": "message",
        "role": "assistant",
        "content": content,
        "model": resp.model,
        "stop_reason": finish::to_claude(resp.finish_reason.unwrap_or(FinishReason::Stop)),
        "stop_sequence": null,
        "usage": {
            "input_tokens": usage.prompt_tokens,
            "output_tokens": usage.completion_tokens,
        },
    })
}

/// `input` must be an object; non-object arguments degrade to `{}`.
fn tool_input(call: &ToolCall) -> Value {
    match &call.function.arguments {
        Value::Object(_) => call.function.arguments.clone(),
        _ => json!({}),
    }
}

/// Read a `message` object back into the unified shape.
pub fn parse_message(v: &Value) -> ChatResponse {
    let mut texts = Vec::new();
    let mut tool_calls = Vec::new();
    for block in v["content"].as_array().into_iter().flatten() {
        match block["type"].as_str() {
            Some("text") => texts.push(block["text"].as_str().unwrap_or_default()),
            Some("tool_use") => tool_calls.push(ToolCall::function(
                block["id"].as_str().unwrap_or_default(),
                block["name"].as_str().unwrap_or_default(),
                block.get("input").cloned().unwrap_or_else(|| json!({})),
            )),
            _ => {}
        }
    }

    ChatResponse {
        content: texts.concat(),
        role: Role::Assistant,
        model: v["model"].as_str().unwrap_or_default().to_string(),
        session_id: None,
        finish_reason: v["stop_reason"].as_str().map(finish::from_claude),
        usage: Some(Usage::new(
            v["usage"]["input_tokens"].as_u64().unwrap_or(0),
            v["usage"]["output_tokens"].as_u64().unwrap_or(0),
        )),
        tool_calls,
    }
}

/// Anthropic-style error body.
pub fn error_body(error_type: &str, message: &str) -> Value {
    json!({
        "type": "error",
        "error": {"type": error_type, "message": message},
    })
}

// ── Stream ──

/// Streams the Messages event sequence: `message_start`,
/// `content_block_start`, `content_block_delta`*, `content_block_stop`,
/// `message_delta`, `message_stop`.
pub struct ClaudeStream {
    id: String,
    model: String,
    next_index: usize,
    open_text_block: Option<usize>,
}

impl ClaudeStream {
    pub fn new(model: &str) -> Self {
        Self::with_id(ids::message_id(), model)
    }

    pub fn with_id(id: impl Into<String>, model: &str) -> Self {
        Self {
            id: id.into(),
            model: model.to_string(),
            next_index: 0,
            open_text_block: None,
        }
    }

    fn start_block(&mut self, content_block: Value) -> (usize, Frame) {
        let index = self.next_index;
        self.next_index += 1;
        let frame = Frame::event(
            "content_block_start",
            json!({"type": "content_block_start", "index": index, "content_block": content_block}),
        );
        (index, frame)
    }

    fn stop_block(index: usize) -> Frame {
        Frame::event(
            "content_block_stop",
            json!({"type": "content_block_stop", "index": index}),
        )
    }

    fn close_text_block(&mut self) -> Option<Frame> {
        self.open_text_block.take().map(Self::stop_block)
    }
}

impl StreamEncoder for ClaudeStream {
    fn open(&mut self) -> Vec<Frame> {
        let start = Frame::event(
            "message_start",
            json!({
                "type": "message_start",
                "message": {
                    "id": self.id,
                    "type": "message",
                    "role": "assistant",
                    "content": [],
                    "model": self.model,
                    "stop_reason": null,
                    "stop_sequence": null,
                    "usage": {"input_tokens": 0, "output_tokens": 0},
                },
            }),
        );
        let (index, block) = self.start_block(json!({"type": "text", "text": ""}));
        self.open_text_block = Some(index);
        vec![start, block]
    }

    fn chunk(&mut self, c: &ChatChunk) -> Vec<Frame> {
        let mut frames = Vec::new();

        if let Some(text) = c.content.as_deref().filter(|t| !t.is_empty()) {
            let index = match self.open_text_block {
                Some(index) => index,
                None => {
                    let (index, frame) = self.start_block(json!({"type": "text", "text": ""}));
                    frames.push(frame);
                    self.open_text_block = Some(index);
                    index
                }
            };
            frames.push(Frame::event(
                "content_block_delta",
                json!({
                    "type": "content_block_delta",
                    "index": index,
                    "delta": {"type": "text_delta", "text": text},
                }),
            ));
        }

        for call in &c.tool_calls {
            frames.extend(self.close_text_block());
            let (index, start) = self.start_block(json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.function.name,
                "input": {},
            }));
            frames.push(start);
            frames.push(Frame::event(
                "content_block_delta",
                json!({
                    "type": "content_block_delta",
                    "index": index,
                    "delta": {"type": "input_json_delta", "partial_json": tool_input(call).to_string()},
                }),
            ));
            frames.push(Self::stop_block(index));
        }

        frames
    }

    fn finish(&mut self, reason: FinishReason, usage: Option<Usage>) -> Vec<Frame> {
        let mut frames: Vec<Frame> = self.close_text_block().into_iter().collect();
        let output_tokens = usage.map_or(0, |u| u.completion_tokens);
        frames.push(Frame::event(
            "message_delta",
            json!({
                "type": "message_delta",
                "delta": {"stop_reason": finish::to_claude(reason), "stop_sequence": null},
                "usage": {"output_tokens": output_tokens},
            }),
        ));
        frames.push(Frame::event("message_stop", json!({"type": "message_stop"})));
        frames
    }

    fn error(&mut self, err: &GatewayError) -> Vec<Frame> {
        vec![Frame::event("error", error_body("api_error", &err.to_string()))]
    }
}
