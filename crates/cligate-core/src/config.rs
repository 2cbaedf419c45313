use std::path::PathBuf;
use std::time::Duration;

use crate::chat::{MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS};
use crate::security::ApiKey;

pub const DEFAULT_MAX_CONCURRENCY: usize = 10;
pub const MAX_CONCURRENCY_LIMIT: usize = 100;

/// Which CLI agent a backend drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Claude,
    Gemini,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        }
    }

    /// Environment variable the child reads its key from.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::Claude => "ANTHROPIC_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }

    pub fn default_cli_path(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        }
    }

    /// Model name reported in envelopes built from one-shot executions.
    pub fn execute_model(&self) -> &'static str {
        match self {
            Self::Claude => "claude-code",
            Self::Gemini => "gemini-cli",
        }
    }

    pub fn default_session_dir(&self) -> &'static str {
        match self {
            Self::Claude => "data/claude_sessions",
            Self::Gemini => "data/gemini_sessions",
        }
    }

    pub fn default_allowed_commands(&self) -> &'static str {
        match self {
            Self::Claude => "chat,ask,code,explain,fix,test,review",
            Self::Gemini => "chat,ask,code,explain,fix,test",
        }
    }
}

/// Per-backend settings. One gateway instance is built from each.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub api_key: ApiKey,
    pub cli_path: String,
    pub max_concurrency: usize,
    pub default_timeout: Duration,
    pub session_dir: PathBuf,
    pub allowed_commands: Vec<String>,
    /// Replace inbound Claude-style system prompts with a short fixed one.
    pub optimize_system_prompt: bool,
}

impl BackendConfig {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            api_key: ApiKey::default(),
            cli_path: kind.default_cli_path().into(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            default_timeout: Duration::from_secs(300),
            session_dir: PathBuf::from(kind.default_session_dir()),
            allowed_commands: parse_allowed_commands(kind.default_allowed_commands()),
            optimize_system_prompt: false,
        }
    }

    pub fn claude() -> Self {
        Self::new(BackendKind::Claude)
    }

    pub fn gemini() -> Self {
        Self::new(BackendKind::Gemini)
    }

    pub fn is_allowed(&self, command: &str) -> bool {
        self.allowed_commands.iter().any(|c| c == command)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CONCURRENCY_LIMIT).contains(&self.max_concurrency) {
            return Err(ConfigError::OutOfRange {
                field: "max_concurrency",
                value: self.max_concurrency.to_string(),
            });
        }
        let secs = self.default_timeout.as_secs_f64();
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&secs) {
            return Err(ConfigError::OutOfRange {
                field: "default_timeout",
                value: secs.to_string(),
            });
        }
        if self.cli_path.trim().is_empty() {
            return Err(ConfigError::Empty("cli_path"));
        }
        if self.allowed_commands.is_empty() {
            return Err(ConfigError::Empty("allowed_commands"));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: String },
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Comma-separated allow-list; blanks are dropped.
pub fn parse_allowed_commands(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_defaults() {
        let c = BackendConfig::claude();
        assert_eq!(c.cli_path, "claude");
        assert_eq!(c.max_concurrency, 10);
        assert_eq!(c.default_timeout, Duration::from_secs(300));
        assert_eq!(c.session_dir, PathBuf::from("data/claude_sessions"));
        assert_eq!(c.allowed_commands.len(), 7);
        assert!(c.is_allowed("review"));
        assert_eq!(c.kind.api_key_env(), "ANTHROPIC_API_KEY");
        assert!(c.validate().is_ok());
    }

    #[test]
    fn gemini_defaults() {
        let c = BackendConfig::gemini();
        assert_eq!(c.cli_path, "gemini");
        assert!(!c.is_allowed("review"));
        assert!(c.is_allowed("fix"));
        assert_eq!(c.kind.api_key_env(), "GEMINI_API_KEY");
    }

    #[test]
    fn concurrency_bounds() {
        let mut c = BackendConfig::claude();
        c.max_concurrency = 0;
        assert!(c.validate().is_err());
        c.max_concurrency = 101;
        assert!(c.validate().is_err());
        c.max_concurrency = 100;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn timeout_bounds() {
        let mut c = BackendConfig::claude();
        c.default_timeout = Duration::from_millis(500);
        assert!(c.validate().is_err());
        c.default_timeout = Duration::from_secs(3601);
        assert!(c.validate().is_err());
    }

    #[test]
    fn allowed_commands_parsing() {
        assert_eq!(parse_allowed_commands("chat, ask,,code "), vec!["chat", "ask", "code"]);
        assert!(parse_allowed_commands("").is_empty());
    }
}
