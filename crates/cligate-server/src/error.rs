use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{error, warn};

use cligate_core::GatewayError;
use cligate_wire::{claude, gemini};

/// Error body convention of the route that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorStyle {
    /// `{"detail": "..."}`
    Detail,
    /// `{"type":"error","error":{"type","message"}}`
    Anthropic,
    /// `{"error":{"code","message","status"}}`
    Google,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: Value,
}

pub fn status_for(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::CommandNotAllowed { .. } => StatusCode::FORBIDDEN,
        GatewayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::InvalidResponseFormat { .. } => StatusCode::BAD_REQUEST,
        GatewayError::ProcessFailed { .. }
        | GatewayError::CliNotFound(_)
        | GatewayError::SessionStorage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn google_status(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => "INVALID_ARGUMENT",
        StatusCode::FORBIDDEN => "PERMISSION_DENIED",
        StatusCode::NOT_FOUND => "NOT_FOUND",
        StatusCode::GATEWAY_TIMEOUT => "DEADLINE_EXCEEDED",
        _ => "INTERNAL",
    }
}

impl ApiError {
    pub fn new(status: StatusCode, message: &str, style: ErrorStyle) -> Self {
        let body = match style {
            ErrorStyle::Detail => json!({"detail": message}),
            ErrorStyle::Anthropic => claude::error_body("api_error", message),
            ErrorStyle::Google => gemini::error_body(status.as_u16(), message, google_status(status)),
        };
        Self { status, body }
    }

    pub fn gateway(err: GatewayError, style: ErrorStyle) -> Self {
        let status = status_for(&err);
        if err.is_client_error() {
            warn!(kind = err.error_kind(), error = %err, "request rejected");
        } else {
            error!(kind = err.error_kind(), error = %err, "request failed");
        }
        Self::new(status, &err.to_string(), style)
    }

    /// Field-level validation failure.
    pub fn validation(message: &str, style: ErrorStyle) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message, style)
    }

    pub fn rejected(rejection: JsonRejection, style: ErrorStyle) -> Self {
        Self::validation(&rejection.body_text(), style)
    }

    pub fn not_found(style: ErrorStyle) -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not Found", style)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
