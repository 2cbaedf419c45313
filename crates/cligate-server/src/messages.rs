//! `POST /v1/messages`, served by the Claude backend.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;

use cligate_core::chat::WireFormat;
use cligate_core::ids;
use cligate_engine::ChatOutcome;
use cligate_wire::claude::{self, ConvertOptions, MessagesRequest};

use crate::error::{ApiError, ErrorStyle};
use crate::server::AppState;
use crate::sse::event_stream;

const STYLE: ErrorStyle = ErrorStyle::Anthropic;

pub async fn create_message(
    State(state): State<AppState>,
    body: Result<Json<MessagesRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::rejected(e, STYLE))?;
    let backend = &state.claude;
    let options = ConvertOptions {
        optimize_system_prompt: backend.config().optimize_system_prompt,
    };

    let mut chat = claude::to_chat_request(req, options);
    chat.timeout = backend.config().default_timeout.as_secs_f64();
    chat.validate().map_err(|e| ApiError::validation(&e, STYLE))?;

    let outcome = backend.chat(chat).await.map_err(|e| ApiError::gateway(e, STYLE))?;
    Ok(match outcome {
        ChatOutcome::Stream(frames) => event_stream(frames, WireFormat::Claude),
        ChatOutcome::Complete(resp) => Json(claude::message(&resp, &ids::message_id())).into_response(),
    })
}
