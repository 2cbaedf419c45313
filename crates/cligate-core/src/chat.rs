//! Unified chat representation shared by every wire format and backend.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::ids::SessionId;

pub const DEFAULT_MODEL: &str = "claude-3.5-sonnet";
pub const DEFAULT_TIMEOUT_SECS: f64 = 300.0;
pub const MIN_TIMEOUT_SECS: f64 = 1.0;
pub const MAX_TIMEOUT_SECS: f64 = 3600.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// One typed block inside a multi-part message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    #[serde(other)]
    Unsupported,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::ImageUrl {
            image_url: ImageUrl {
                url: url.into(),
                detail: None,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl MessageContent {
    /// Text blocks joined with `sep`; images and unknown blocks are skipped.
    pub fn joined_text(&self, sep: &str) -> String {
        match self {
            Self::Text(t) => t.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(sep),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(t) => t.is_empty(),
            Self::Blocks(b) => b.is_empty(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn new(role: Role, content: MessageContent) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, MessageContent::Text(text.into()))
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, MessageContent::Text(text.into()))
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, MessageContent::Text(text.into()))
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::Text(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Structured internally; a JSON-encoded string on the wire.
    #[serde(default = "empty_object", with = "arguments")]
    pub arguments: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn function(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments,
            },
        }
    }

    /// Arguments rendered as the JSON string the wire formats carry.
    pub fn arguments_json(&self) -> String {
        arguments::encode(&self.function.arguments)
    }
}

fn function_kind() -> String {
    "function".into()
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// Arguments travel as JSON text but are compared structurally.
pub mod arguments {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    /// Strings holding JSON are decoded; anything else is kept as given.
    pub fn decode(raw: Value) -> Value {
        match raw {
            Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
            Value::Null => super::empty_object(),
            other => other,
        }
    }

    pub fn encode(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn serialize<S: Serializer>(value: &Value, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Value, D::Error> {
        Ok(decode(Value::deserialize(de)?))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object")]
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionTool {
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionDefinition,
}

impl FunctionTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: function_kind(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoiceMode {
    Auto,
    Required,
    None,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionName {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedToolChoice {
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionName,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(ToolChoiceMode),
    Named(NamedToolChoice),
}

impl ToolChoice {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(NamedToolChoice {
            kind: function_kind(),
            function: FunctionName { name: name.into() },
        })
    }
}

/// Response shape a caller asks for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    Native,
    Claude,
    Gemini,
}

impl WireFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Native => "native",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    Error,
}

impl FinishReason {
    /// Lenient parse of a backend-reported reason. Unknown values mean `Stop`.
    pub fn parse(s: &str) -> Self {
        match s {
            "length" | "max_tokens" => Self::Length,
            "tool_calls" | "tool_use" => Self::ToolCalls,
            "error" => Self::Error,
            _ => Self::Stop,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ToolCalls => "tool_calls",
            Self::Error => "error",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_true")]
    pub stream: bool,
    #[serde(default)]
    pub response_format: WireFormat,
    /// Seconds.
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    #[serde(default)]
    pub include_tools: bool,
    #[serde(default = "default_temperature")]
    pub temperature: Option<f64>,
    #[serde(default = "default_top_p")]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<FunctionTool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            session_id: None,
            model: default_model(),
            stream: true,
            response_format: WireFormat::default(),
            timeout: DEFAULT_TIMEOUT_SECS,
            include_tools: false,
            temperature: default_temperature(),
            top_p: default_top_p(),
            working_dir: None,
            max_tokens: None,
            tools: Vec::new(),
            tool_choice: None,
        }
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    /// Range checks the HTTP layer reports as a validation failure.
    pub fn validate(&self) -> Result<(), String> {
        validate_timeout(self.timeout)?;
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(format!("temperature must be within 0..=2, got {t}"));
            }
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(format!("top_p must be within 0..=1, got {p}"));
            }
        }
        Ok(())
    }
}

pub fn validate_timeout(timeout: f64) -> Result<(), String> {
    if (MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&timeout) {
        Ok(())
    } else {
        Err(format!(
            "timeout must be within {MIN_TIMEOUT_SECS}..={MAX_TIMEOUT_SECS} seconds, got {timeout}"
        ))
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.into()
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> f64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_temperature() -> Option<f64> {
    Some(0.7)
}

fn default_top_p() -> Option<f64> {
    Some(1.0)
}

/// Non-streaming chat result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub role: Role,
    pub model: String,
    pub session_id: Option<SessionId>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ChatResponse {
    pub fn assistant(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role: Role::Assistant,
            model: model.into(),
            session_id: None,
            finish_reason: Some(FinishReason::Stop),
            usage: None,
            tool_calls: Vec::new(),
        }
    }
}

/// One incremental unit of a streamed turn.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

impl ChatChunk {
    pub fn role(role: Role) -> Self {
        Self {
            role: Some(role),
            ..Default::default()
        }
    }

    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn finish(reason: FinishReason) -> Self {
        Self {
            finish_reason: Some(reason),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_defaults() {
        let req: ChatRequest =
            serde_json::from_value(json!({"messages": [{"role": "user", "content": "hi"}]})).unwrap();
        assert_eq!(req.model, "claude-3.5-sonnet");
        assert!(req.stream);
        assert_eq!(req.response_format, WireFormat::OpenAi);
        assert_eq!(req.timeout, 300.0);
        assert!(!req.include_tools);
        assert_eq!(req.temperature, Some(0.7));
        assert_eq!(req.top_p, Some(1.0));
        assert!(req.session_id.is_none());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn request_range_validation() {
        let mut req = ChatRequest::new(vec![ChatMessage::user("hi")]);
        req.timeout = 0.5;
        assert!(req.validate().is_err());
        req.timeout = 3600.0;
        assert!(req.validate().is_ok());
        req.temperature = Some(2.5);
        assert!(req.validate().is_err());
        req.temperature = None;
        req.top_p = Some(1.5);
        assert!(req.validate().is_err());
    }

    #[test]
    fn content_text_or_blocks() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "look"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAA"}},
                {"type": "audio", "data": "x"}
            ]
        }))
        .unwrap();
        let MessageContent::Blocks(blocks) = &msg.content else {
            panic!("expected blocks");
        };
        assert_eq!(blocks[0], ContentBlock::text("look"));
        assert_eq!(blocks[1], ContentBlock::image("data:image/png;base64,AAA"));
        assert_eq!(blocks[2], ContentBlock::Unsupported);
        assert_eq!(msg.content.joined_text(" "), "look");
    }

    #[test]
    fn null_content_becomes_empty_text() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{"id": "call_1", "type": "function",
                            "function": {"name": "f", "arguments": "{\"a\":1}"}}]
        }))
        .unwrap();
        assert!(msg.content.is_empty());
        assert_eq!(msg.tool_calls[0].function.arguments, json!({"a": 1}));
    }

    #[test]
    fn tool_call_arguments_string_on_wire() {
        let call = ToolCall::function("call_1", "read", json!({"path": "/tmp"}));
        let v = serde_json::to_value(&call).unwrap();
        assert_eq!(v["type"], "function");
        assert_eq!(v["function"]["arguments"], "{\"path\":\"/tmp\"}");

        let back: ToolCall = serde_json::from_value(v).unwrap();
        assert_eq!(back, call);
    }

    #[test]
    fn non_json_arguments_are_kept_as_string() {
        let call: ToolCall = serde_json::from_value(json!({
            "id": "c", "function": {"name": "f", "arguments": "not json"}
        }))
        .unwrap();
        assert_eq!(call.kind, "function");
        assert_eq!(call.function.arguments, json!("not json"));
        assert_eq!(call.arguments_json(), "not json");
    }

    #[test]
    fn tool_choice_forms() {
        let auto: ToolChoice = serde_json::from_value(json!("auto")).unwrap();
        assert_eq!(auto, ToolChoice::Mode(ToolChoiceMode::Auto));
        let named: ToolChoice =
            serde_json::from_value(json!({"type": "function", "function": {"name": "f"}})).unwrap();
        assert_eq!(named, ToolChoice::named("f"));
        assert_eq!(serde_json::to_value(ToolChoice::Mode(ToolChoiceMode::Required)).unwrap(), "required");
    }

    #[test]
    fn finish_reason_parse_is_lenient() {
        assert_eq!(FinishReason::parse("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::parse("length"), FinishReason::Length);
        assert_eq!(FinishReason::parse("tool_calls"), FinishReason::ToolCalls);
        assert_eq!(FinishReason::parse("end_turn"), FinishReason::Stop);
        assert_eq!(FinishReason::parse("weird"), FinishReason::Stop);
        assert_eq!(serde_json::to_value(FinishReason::ToolCalls).unwrap(), "tool_calls");
    }

    #[test]
    fn usage_total() {
        let u = Usage::new(3, 4);
        assert_eq!(u.total_tokens, 7);
    }

    #[test]
    fn wire_format_names() {
        assert_eq!(serde_json::to_value(WireFormat::OpenAi).unwrap(), "openai");
        let f: WireFormat = serde_json::from_value(json!("native")).unwrap();
        assert_eq!(f, WireFormat::Native);
        assert_eq!(WireFormat::Gemini.as_str(), "gemini");
    }

    #[test]
    fn chunk_constructors() {
        assert_eq!(ChatChunk::role(Role::Assistant).role, Some(Role::Assistant));
        assert_eq!(ChatChunk::delta("x").finish_reason, None);
        assert_eq!(ChatChunk::finish(FinishReason::Stop).finish_reason, Some(FinishReason::Stop));
    }
}
