use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, unguessable session handle. Generated locally from 16 random
/// bytes, URL-safe base64 without padding.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// `<prefix><n random hex chars>`, e.g. `chatcmpl-1f0c...`.
pub fn hex_id(prefix: &str, len: usize) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}{}", &hex[..len.min(hex.len())])
}

/// Completion id for OpenAI-style envelopes.
pub fn completion_id() -> String {
    hex_id("chatcmpl-", 24)
}

/// Message id for Anthropic-style envelopes.
pub fn message_id() -> String {
    hex_id("msg_", 24)
}

/// Completion id for one-shot execute responses.
pub fn execute_id() -> String {
    hex_id("exec-", 24)
}

/// Fallback id for tool calls that arrive without one.
pub fn tool_call_id() -> String {
    hex_id("call_", 8)
}
