//! `POST /v1beta/models/{model}:generateContent` and
//! `:streamGenerateContent`, served by the Gemini backend.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::debug;

use cligate_core::chat::WireFormat;
use cligate_engine::ChatOutcome;
use cligate_wire::gemini::{self, GenerateContentRequest};

use crate::error::{ApiError, ErrorStyle};
use crate::server::AppState;
use crate::sse::event_stream;

const STYLE: ErrorStyle = ErrorStyle::Google;

pub async fn generate_content(
    State(state): State<AppState>,
    Path(model_action): Path<String>,
    body: Result<Json<GenerateContentRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let (model, stream) =
        gemini::parse_model_action(&model_action).ok_or_else(|| ApiError::not_found(STYLE))?;
    let Json(req) = body.map_err(|e| ApiError::rejected(e, STYLE))?;
    debug!(model = %model, stream, "generateContent request");

    let backend = &state.gemini;
    let mut chat = gemini::to_chat_request(req, &model, stream);
    chat.timeout = backend.config().default_timeout.as_secs_f64();
    chat.validate().map_err(|e| ApiError::validation(&e, STYLE))?;

    let outcome = backend.chat(chat).await.map_err(|e| ApiError::gateway(e, STYLE))?;
    Ok(match outcome {
        ChatOutcome::Stream(frames) => event_stream(frames, WireFormat::Gemini),
        ChatOutcome::Complete(resp) => Json(gemini::response(&resp)).into_response(),
    })
}
