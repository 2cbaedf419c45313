use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::{validate_timeout, WireFormat, DEFAULT_TIMEOUT_SECS};

/// One-shot CLI invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Seconds.
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    #[serde(default)]
    pub response_format: WireFormat,
    #[serde(default)]
    pub working_dir: Option<String>,
}

impl ExecuteRequest {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            timeout: DEFAULT_TIMEOUT_SECS,
            response_format: WireFormat::OpenAi,
            working_dir: None,
        }
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_timeout(self.timeout)
    }
}

fn default_timeout() -> f64 {
    DEFAULT_TIMEOUT_SECS
}

/// Raw stdout, or a structured envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecuteOutput {
    Text(String),
    Structured(Value),
}

impl Default for ExecuteOutput {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub success: bool,
    #[serde(default)]
    pub output: ExecuteOutput,
    pub error: Option<String>,
    pub exit_code: i32,
    /// Wall-clock seconds.
    pub duration: f64,
}

/// Captured outcome of one child process.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
