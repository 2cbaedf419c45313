//! Finish-reason vocabulary per wire format.

use cligate_core::chat::FinishReason;

pub fn to_claude(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::ToolCalls => "tool_use",
        FinishReason::Length => "max_tokens",
        FinishReason::Stop | FinishReason::Error => "end_turn",
    }
}

pub fn from_claude(stop_reason: &str) -> FinishReason {
    match stop_reason {
        "tool_use" => FinishReason::ToolCalls,
        "max_tokens" => FinishReason::Length,
        _ => FinishReason::Stop,
    }
}

/// Gemini reports tool invocations as `STOP` plus `functionCall` parts.
pub fn to_gemini(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Length => "MAX_TOKENS",
        FinishReason::Error => "OTHER",
        FinishReason::Stop | FinishReason::ToolCalls => "STOP",
    }
}

pub fn from_gemini(finish_reason: &str, has_function_call: bool) -> FinishReason {
    match finish_reason {
        "MAX_TOKENS" => FinishReason::Length,
        _ if has_function_call => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_mapping_round_trips() {
        for reason in [FinishReason::Stop, FinishReason::Length, FinishReason::ToolCalls] {
            assert_eq!(from_claude(to_claude(reason)), reason);
        }
        assert_eq!(to_claude(FinishReason::Error), "end_turn");
        assert_eq!(from_claude("stop_sequence"), FinishReason::Stop);
    }

    #[test]
    fn gemini_mapping() {
        assert_eq!(to_gemini(FinishReason::Stop), "STOP");
        assert_eq!(to_gemini(FinishReason::ToolCalls), "STOP");
        assert_eq!(to_gemini(FinishReason::Length), "MAX_TOKENS");
        assert_eq!(from_gemini("STOP", true), FinishReason::ToolCalls);
        assert_eq!(from_gemini("STOP", false), FinishReason::Stop);
        assert_eq!(from_gemini("MAX_TOKENS", false), FinishReason::Length);
        assert_eq!(from_gemini("SAFETY", false), FinishReason::Stop);
    }
}
