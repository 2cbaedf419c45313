use cligate_core::chat::{ChatChunk, FinishReason, Usage, WireFormat};
use cligate_core::GatewayError;

use crate::claude::ClaudeStream;
use crate::frame::Frame;
use crate::gemini::GeminiStream;
use crate::openai::OpenAiStream;

/// Shapes one streamed turn for a particular wire format.
///
/// Call order: `open`, any number of `chunk`, then exactly one of `finish`
/// or `error`.
pub trait StreamEncoder: Send {
    /// Frames sent before any backend output.
    fn open(&mut self) -> Vec<Frame>;

    fn chunk(&mut self, chunk: &ChatChunk) -> Vec<Frame>;

    fn finish(&mut self, reason: FinishReason, usage: Option<Usage>) -> Vec<Frame>;

    /// In-band failure frame; the stream ends after it.
    fn error(&mut self, err: &GatewayError) -> Vec<Frame>;
}

pub fn encoder_for(format: WireFormat, model: &str) -> Box<dyn StreamEncoder> {
    match format {
        WireFormat::OpenAi => Box::new(OpenAiStream::new(model)),
        WireFormat::Native => Box::new(NativeStream),
        WireFormat::Claude => Box::new(ClaudeStream::new(model)),
        WireFormat::Gemini => Box::new(GeminiStream::new(model)),
    }
}

/// Marker the transport appends after the last frame, if the format has one.
pub fn terminator(format: WireFormat) -> Option<Frame> {
    match format {
        WireFormat::OpenAi => Some(Frame::Done),
        WireFormat::Native | WireFormat::Claude | WireFormat::Gemini => None,
    }
}

/// Backend lines passed through one per line.
pub struct NativeStream;

impl StreamEncoder for NativeStream {
    fn open(&mut self) -> Vec<Frame> {
        Vec::new()
    }

    fn chunk(&mut self, chunk: &ChatChunk) -> Vec<Frame> {
        match chunk.content.as_deref() {
            Some(text) if !text.is_empty() => vec![Frame::Raw(format!("{text}\n"))],
            _ => Vec::new(),
        }
    }

    fn finish(&mut self, _reason: FinishReason, _usage: Option<Usage>) -> Vec<Frame> {
        Vec::new()
    }

    fn error(&mut self, err: &GatewayError) -> Vec<Frame> {
        vec![Frame::Raw(format!("[Error: {err}]\n"))]
    }
}
