//! CLI gateway routes, mounted once per backend.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::info;

use cligate_core::chat::{ChatRequest, WireFormat};
use cligate_core::exec::ExecuteRequest;
use cligate_core::ids::{self, SessionId};
use cligate_core::session::CreateSessionRequest;
use cligate_engine::{ChatOrchestrator, ChatOutcome};
use cligate_wire::{claude, gemini};

use crate::error::{ApiError, ErrorStyle};
use crate::sse::event_stream;

const STYLE: ErrorStyle = ErrorStyle::Detail;

type Backend = State<Arc<ChatOrchestrator>>;

pub fn routes(backend: Arc<ChatOrchestrator>) -> Router {
    Router::new()
        .route("/execute", post(execute))
        .route("/chat", post(chat))
        .route("/sessions", get(list_sessions).post(create_session))
        .route("/sessions/{session_id}", delete(delete_session))
        .route("/health", get(health))
        .with_state(backend)
}

async fn execute(
    State(backend): Backend,
    body: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::rejected(e, STYLE))?;
    req.validate().map_err(|e| ApiError::validation(&e, STYLE))?;
    let resp = backend
        .execute(req)
        .await
        .map_err(|e| ApiError::gateway(e, STYLE))?;
    Ok(Json(resp).into_response())
}

async fn chat(
    State(backend): Backend,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::rejected(e, STYLE))?;
    req.validate().map_err(|e| ApiError::validation(&e, STYLE))?;
    let format = req.response_format;
    let outcome = backend.chat(req).await.map_err(|e| ApiError::gateway(e, STYLE))?;

    Ok(match outcome {
        ChatOutcome::Stream(frames) => event_stream(frames, format),
        ChatOutcome::Complete(resp) => match format {
            WireFormat::OpenAi | WireFormat::Native => Json(resp).into_response(),
            WireFormat::Claude => Json(claude::message(&resp, &ids::message_id())).into_response(),
            WireFormat::Gemini => Json(gemini::response(&resp)).into_response(),
        },
    })
}

async fn list_sessions(State(backend): Backend) -> Response {
    Json(backend.list_sessions().await).into_response()
}

async fn create_session(
    State(backend): Backend,
    body: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::rejected(e, STYLE))?;
    let session = backend
        .create_session(&req)
        .await
        .map_err(|e| ApiError::gateway(e, STYLE))?;
    Ok(Json(session).into_response())
}

async fn delete_session(
    State(backend): Backend,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let id = SessionId::from_raw(session_id);
    backend
        .delete_session(&id)
        .await
        .map_err(|e| ApiError::gateway(e, STYLE))?;
    info!(session_id = %id, "session deleted");
    Ok(Json(json!({
        "status": "success",
        "message": format!("Session {id} deleted"),
    }))
    .into_response())
}

async fn health(State(backend): Backend) -> Response {
    Json(backend.health()).into_response()
}
