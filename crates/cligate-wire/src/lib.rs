//! Translation between the unified chat representation and the wire
//! formats the gateway speaks: native CLI output, OpenAI chat completions,
//! Anthropic Messages and Google generateContent.

pub mod claude;
pub mod finish;
pub mod frame;
pub mod gemini;
pub mod native;
pub mod openai;
pub mod prompt;
pub mod stream;

pub use frame::Frame;
pub use native::NativeOutput;
pub use stream::{encoder_for, terminator, StreamEncoder};

/// Unix seconds, as carried in `created` fields.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
