use std::time::Duration;

/// Typed error hierarchy for gateway operations.
/// Classifies errors as caller faults or backend/operational failures.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum GatewayError {
    // Caller faults
    #[error("Command '{command}' is not allowed: Allowed commands: {}", allowed.join(", "))]
    CommandNotAllowed { command: String, allowed: Vec<String> },
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Invalid response format: Expected: {expected}, Got: {actual}")]
    InvalidResponseFormat { expected: String, actual: String },

    // Backend
    #[error("Process timeout after {} seconds: {command}", timeout.as_secs_f64())]
    Timeout { timeout: Duration, command: String },
    #[error("Process failed with exit code {exit_code}: {message}")]
    ProcessFailed { exit_code: i32, message: String },
    #[error("CLI executable not found: {0}")]
    CliNotFound(String),

    // Operational
    #[error("Session storage error: {operation}: {details}")]
    SessionStorage { operation: String, details: String },
}

impl GatewayError {
    pub fn timeout(timeout: Duration, argv: &[String]) -> Self {
        Self::Timeout {
            timeout,
            command: argv.join(" "),
        }
    }

    pub fn process_failed(exit_code: i32, message: impl Into<String>) -> Self {
        Self::ProcessFailed {
            exit_code,
            message: message.into(),
        }
    }

    pub fn storage(operation: impl Into<String>, details: impl Into<String>) -> Self {
        Self::SessionStorage {
            operation: operation.into(),
            details: details.into(),
        }
    }

    /// True when the request itself was at fault rather than the backend.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::CommandNotAllowed { .. }
                | Self::SessionNotFound(_)
                | Self::InvalidResponseFormat { .. }
        )
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::CommandNotAllowed { .. } => "command_not_allowed",
            Self::SessionNotFound(_) => "session_not_found",
            Self::InvalidResponseFormat { .. } => "invalid_response_format",
            Self::Timeout { .. } => "timeout",
            Self::ProcessFailed { .. } => "process_failed",
            Self::CliNotFound(_) => "cli_not_found",
            Self::SessionStorage { .. } => "session_storage_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_error_classification() {
        assert!(GatewayError::SessionNotFound("abc".into()).is_client_error());
        assert!(GatewayError::CommandNotAllowed {
            command: "rm".into(),
            allowed: vec!["chat".into()],
        }
        .is_client_error());
        assert!(!GatewayError::process_failed(2, "boom").is_client_error());
        assert!(!GatewayError::CliNotFound("claude".into()).is_client_error());
    }

    #[test]
    fn timeout_joins_argv() {
        let argv = vec!["claude".to_string(), "chat".into(), "--prompt".into(), "hi".into()];
        let err = GatewayError::timeout(Duration::from_secs(5), &argv);
        match &err {
            GatewayError::Timeout { timeout, command } => {
                assert_eq!(*timeout, Duration::from_secs(5));
                assert_eq!(command, "claude chat --prompt hi");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "Process timeout after 5 seconds: claude chat --prompt hi"
        );
    }

    #[test]
    fn display_messages() {
        let err = GatewayError::CommandNotAllowed {
            command: "rm".into(),
            allowed: vec!["chat".into(), "ask".into()],
        };
        assert_eq!(
            err.to_string(),
            "Command 'rm' is not allowed: Allowed commands: chat, ask"
        );
        assert_eq!(
            GatewayError::process_failed(2, "boom").to_string(),
            "Process failed with exit code 2: boom"
        );
        assert_eq!(
            GatewayError::storage("save", "disk full").to_string(),
            "Session storage error: save: disk full"
        );
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(GatewayError::SessionNotFound("x".into()).error_kind(), "session_not_found");
        assert_eq!(GatewayError::process_failed(-1, "spawn").error_kind(), "process_failed");
        assert_eq!(
            GatewayError::timeout(Duration::from_secs(1), &[]).error_kind(),
            "timeout"
        );
        assert_eq!(GatewayError::CliNotFound("x".into()).error_kind(), "cli_not_found");
    }
}
