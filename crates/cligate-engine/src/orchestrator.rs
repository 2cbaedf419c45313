//! One backend's façade: validates, admits, runs and translates.

use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures::Stream;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use cligate_core::chat::{ChatChunk, ChatRequest, ChatResponse, FinishReason, WireFormat};
use cligate_core::config::BackendConfig;
use cligate_core::exec::{ExecuteOutput, ExecuteRequest, ExecuteResponse};
use cligate_core::ids::{self, SessionId};
use cligate_core::session::{CreateSessionRequest, Session};
use cligate_core::GatewayError;
use cligate_store::SessionStore;
use cligate_wire::{encoder_for, openai, prompt, Frame, NativeOutput};

use crate::command::{execute_argv, CommandBuilder, OutputFormat};
use crate::gate::ConcurrencyGate;
use crate::probe::resolve_executable;
use crate::process::run_process;
use crate::streaming::LineStream;

pub type FrameStream = Pin<Box<dyn Stream<Item = Frame> + Send>>;

/// Result of a chat turn: a whole response, or frames already shaped for the
/// requested wire format.
pub enum ChatOutcome {
    Complete(ChatResponse),
    Stream(FrameStream),
}

#[derive(Clone, Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub backend: &'static str,
    pub has_api_key: bool,
    pub cli_path: String,
    pub cli_available: bool,
    pub max_concurrency: usize,
    pub available_permits: usize,
}

pub struct ChatOrchestrator {
    config: BackendConfig,
    gate: ConcurrencyGate,
    store: Arc<SessionStore>,
}

impl ChatOrchestrator {
    /// Open the backend's session store and size its gate from `config`.
    pub async fn new(config: BackendConfig) -> Result<Self, GatewayError> {
        let store = SessionStore::open(&config.session_dir).await?;
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: BackendConfig, store: SessionStore) -> Self {
        Self {
            gate: ConcurrencyGate::new(config.max_concurrency),
            config,
            store: Arc::new(store),
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Inherited environment plus the backend's key variable, when one is set.
    fn child_env(&self) -> Vec<(String, String)> {
        if self.config.api_key.is_configured() {
            vec![(
                self.config.kind.api_key_env().to_string(),
                self.config.api_key.expose().to_string(),
            )]
        } else {
            Vec::new()
        }
    }

    fn ensure_cli(&self) -> Result<(), GatewayError> {
        resolve_executable(&self.config.cli_path).map(drop)
    }

    // ── Execute ──

    #[instrument(skip(self, req), fields(backend = self.config.kind.name(), command = %req.command))]
    pub async fn execute(&self, req: ExecuteRequest) -> Result<ExecuteResponse, GatewayError> {
        if !self.config.is_allowed(&req.command) {
            return Err(GatewayError::CommandNotAllowed {
                command: req.command,
                allowed: self.config.allowed_commands.clone(),
            });
        }
        if matches!(req.response_format, WireFormat::Claude | WireFormat::Gemini) {
            return Err(GatewayError::InvalidResponseFormat {
                expected: "openai or native".into(),
                actual: req.response_format.as_str().into(),
            });
        }
        self.ensure_cli()?;

        let argv = execute_argv(&self.config.cli_path, &req.command, &req.args);
        let env = self.child_env();
        let timeout = req.timeout_duration();
        let started = Instant::now();

        let run = async {
            let _permit = self.gate.acquire().await?;
            run_process(&argv, &env, req.working_dir.as_deref().map(Path::new), timeout).await
        };
        let outcome = tokio::time::timeout(timeout, run)
            .await
            .map_err(|_| GatewayError::timeout(timeout, &argv))?;

        let result = match outcome {
            Ok(result) => result,
            Err(GatewayError::ProcessFailed { exit_code, message }) => {
                info!(exit_code, "command failed");
                return Ok(ExecuteResponse {
                    success: false,
                    output: ExecuteOutput::Text(message.clone()),
                    error: Some(message),
                    exit_code,
                    duration: started.elapsed().as_secs_f64(),
                });
            }
            Err(e) => return Err(e),
        };

        let output = match req.response_format {
            WireFormat::OpenAi => {
                let resp = NativeOutput::parse(&result.stdout)
                    .to_chat_response(self.config.kind.execute_model());
                ExecuteOutput::Structured(openai::completion(
                    &resp,
                    &ids::execute_id(),
                    cligate_wire::unix_now(),
                ))
            }
            _ => ExecuteOutput::Text(result.stdout),
        };

        Ok(ExecuteResponse {
            success: true,
            output,
            error: None,
            exit_code: result.exit_code,
            duration: result.duration.as_secs_f64(),
        })
    }

    // ── Chat ──

    fn chat_argv(&self, req: &ChatRequest, session: &Session, format: OutputFormat) -> Vec<String> {
        CommandBuilder::new(&self.config.cli_path, prompt::build_user_prompt(&req.messages))
            .model(&req.model)
            .session(session.session_id.clone())
            .include_tools(req.include_tools)
            .output_format(format)
            .sampling(req.temperature, req.top_p)
            .build()
    }

    /// Run one chat turn. Failures before the first frame are returned as
    /// errors; once streaming has begun they become an in-band error frame.
    #[instrument(skip(self, req), fields(backend = self.config.kind.name(), stream = req.stream))]
    pub async fn chat(&self, req: ChatRequest) -> Result<ChatOutcome, GatewayError> {
        self.ensure_cli()?;
        let session = self
            .store
            .get_or_create(
                req.session_id.as_ref(),
                Some(&CreateSessionRequest {
                    working_dir: req.working_dir.clone(),
                    model: req.model.clone(),
                }),
            )
            .await?;
        debug!(session_id = %session.session_id, "session resolved");

        if req.stream {
            Ok(ChatOutcome::Stream(self.stream_chat(req, session)))
        } else {
            self.complete_chat(req, session).await.map(ChatOutcome::Complete)
        }
    }

    async fn complete_chat(&self, req: ChatRequest, session: Session) -> Result<ChatResponse, GatewayError> {
        let argv = self.chat_argv(&req, &session, OutputFormat::Json);
        let env = self.child_env();
        let timeout = req.timeout_duration();

        let run = async {
            let _permit = self.gate.acquire().await?;
            run_process(&argv, &env, req.working_dir.as_deref().map(Path::new), timeout).await
        };
        let result = tokio::time::timeout(timeout, run)
            .await
            .map_err(|_| GatewayError::timeout(timeout, &argv))??;

        let mut resp = NativeOutput::parse(&result.stdout).to_chat_response(&req.model);
        resp.session_id = Some(session.session_id.clone());
        self.store.increment_message_count(&session.session_id).await?;
        Ok(resp)
    }

    fn stream_chat(&self, req: ChatRequest, session: Session) -> FrameStream {
        let argv = self.chat_argv(&req, &session, OutputFormat::Text);
        let env = self.child_env();
        let timeout = req.timeout_duration();
        let cwd = req.working_dir.clone();
        let gate = self.gate.clone();
        let store = Arc::clone(&self.store);
        let session_id = session.session_id;
        let mut encoder = encoder_for(req.response_format, &req.model);

        Box::pin(async_stream::stream! {
            for frame in encoder.open() {
                yield frame;
            }

            let permit = match tokio::time::timeout(timeout, gate.acquire()).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(e)) => {
                    for frame in encoder.error(&e) {
                        yield frame;
                    }
                    return;
                }
                Err(_) => {
                    let err = GatewayError::timeout(timeout, &argv);
                    warn!(error = %err, "no process slot before timeout");
                    for frame in encoder.error(&err) {
                        yield frame;
                    }
                    return;
                }
            };

            let mut lines = match LineStream::spawn(&argv, &env, cwd.as_deref().map(Path::new), timeout) {
                Ok(lines) => lines,
                Err(e) => {
                    warn!(error = %e, "failed to start streaming process");
                    for frame in encoder.error(&e) {
                        yield frame;
                    }
                    return;
                }
            };

            while let Some(item) = lines.next_line().await {
                match item {
                    Ok(line) if line.trim().is_empty() => {}
                    Ok(line) => {
                        for frame in encoder.chunk(&ChatChunk::delta(line)) {
                            yield frame;
                        }
                    }
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "stream failed");
                        for frame in encoder.error(&e) {
                            yield frame;
                        }
                        return;
                    }
                }
            }
            drop(permit);

            if let Err(e) = store.increment_message_count(&session_id).await {
                warn!(session_id = %session_id, error = %e, "failed to record turn");
            }
            for frame in encoder.finish(FinishReason::Stop, None) {
                yield frame;
            }
        })
    }

    // ── Sessions ──

    pub async fn list_sessions(&self) -> Vec<Session> {
        self.store.list().await
    }

    pub async fn create_session(&self, req: &CreateSessionRequest) -> Result<Session, GatewayError> {
        Ok(self.store.create(req).await?)
    }

    pub async fn get_session(&self, id: &SessionId) -> Option<Session> {
        self.store.get(id).await
    }

    pub async fn delete_session(&self, id: &SessionId) -> Result<(), GatewayError> {
        Ok(self.store.delete(id).await?)
    }

    pub async fn cleanup_sessions(&self, max_age_hours: f64) -> Result<usize, GatewayError> {
        Ok(self.store.cleanup_expired(max_age_hours).await?)
    }

    pub fn health(&self) -> Health {
        Health {
            status: "ok",
            backend: self.config.kind.name(),
            has_api_key: self.config.api_key.is_configured(),
            cli_path: self.config.cli_path.clone(),
            cli_available: self.ensure_cli().is_ok(),
            max_concurrency: self.gate.capacity(),
            available_permits: self.gate.available(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{script_dir, write_script};
    use cligate_core::chat::ChatMessage;
    use cligate_core::security::ApiKey;
    use futures::StreamExt;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        orch: ChatOrchestrator,
        _scripts: TempDir,
        _sessions: TempDir,
    }

    async fn fixture(body: &str) -> Fixture {
        let scripts = script_dir();
        let cli = write_script(&scripts, "fake-claude", body);
        let sessions = tempfile::tempdir().unwrap();
        let mut config = BackendConfig::claude();
        config.cli_path = cli;
        config.session_dir = sessions.path().to_path_buf();
        config.max_concurrency = 2;
        Fixture {
            orch: ChatOrchestrator::new(config).await.unwrap(),
            _scripts: scripts,
            _sessions: sessions,
        }
    }

    fn exec(command: &str, args: &[&str], timeout: f64) -> ExecuteRequest {
        let mut req = ExecuteRequest::new(command, args.iter().map(|a| a.to_string()).collect());
        req.timeout = timeout;
        req
    }

    fn chat_request(stream: bool, format: WireFormat) -> ChatRequest {
        let mut req = ChatRequest::new(vec![ChatMessage::user("hi")]);
        req.stream = stream;
        req.response_format = format;
        req.timeout = 5.0;
        req
    }

    async fn collect(outcome: ChatOutcome) -> Vec<Frame> {
        match outcome {
            ChatOutcome::Stream(stream) => stream.collect().await,
            ChatOutcome::Complete(_) => panic!("expected a stream"),
        }
    }

    #[tokio::test]
    async fn execute_openai_output() {
        let f = fixture(r#"echo '{"content":"hello","finish_reason":"stop"}'"#).await;
        let resp = f.orch.execute(exec("chat", &["--prompt", "hi"], 5.0)).await.unwrap();
        assert!(resp.success);
        assert_eq!(resp.exit_code, 0);
        assert!(resp.error.is_none());
        let ExecuteOutput::Structured(body) = resp.output else {
            panic!("expected structured output");
        };
        assert_eq!(body["object"], "chat.completion");
        assert_eq!(body["model"], "claude-code");
        assert_eq!(body["choices"][0]["message"]["content"], "hello");
        assert!(body["id"].as_str().unwrap().starts_with("exec-"));
    }

    #[tokio::test]
    async fn execute_passes_argv_verbatim() {
        let f = fixture(r#"for a in "$@"; do echo "[$a]"; done"#).await;
        let mut req = exec("ask", &["--prompt", "a b; c"], 5.0);
        req.response_format = WireFormat::Native;
        let resp = f.orch.execute(req).await.unwrap();
        assert_eq!(resp.output, ExecuteOutput::Text("[ask]\n[--prompt]\n[a b; c]\n".into()));
    }

    #[tokio::test]
    async fn execute_failure_is_a_response() {
        let f = fixture("echo boom >&2; exit 2").await;
        let resp = f.orch.execute(exec("chat", &[], 5.0)).await.unwrap();
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("boom"));
        assert_eq!(resp.exit_code, 2);
    }

    #[tokio::test]
    async fn execute_rejects_unlisted_command_without_spawning() {
        let scripts = script_dir();
        let marker = scripts.path().join("spawned");
        let f = fixture(&format!("touch {}", marker.display())).await;
        let err = f.orch.execute(exec("rm", &["-rf", "/"], 5.0)).await.unwrap_err();
        assert!(matches!(err, GatewayError::CommandNotAllowed { .. }));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn execute_rejects_wire_only_formats() {
        let f = fixture("true").await;
        let mut req = exec("chat", &[], 5.0);
        req.response_format = WireFormat::Gemini;
        let err = f.orch.execute(req).await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::InvalidResponseFormat {
                expected: "openai or native".into(),
                actual: "gemini".into()
            }
        );
    }

    #[tokio::test]
    async fn execute_timeout() {
        let f = fixture("exec sleep 30").await;
        let err = f.orch.execute(exec("chat", &[], 1.0)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_cli_is_reported() {
        let sessions = tempfile::tempdir().unwrap();
        let mut config = BackendConfig::claude();
        config.cli_path = "/no/such/claude".into();
        config.session_dir = sessions.path().to_path_buf();
        let orch = ChatOrchestrator::new(config).await.unwrap();
        let err = orch.execute(exec("chat", &[], 5.0)).await.unwrap_err();
        assert_eq!(err, GatewayError::CliNotFound("/no/such/claude".into()));
        assert!(!orch.health().cli_available);
    }

    #[tokio::test]
    async fn api_key_reaches_child_environment() {
        let scripts = script_dir();
        let cli = write_script(&scripts, "fake", r#"echo "$ANTHROPIC_API_KEY""#);
        let sessions = tempfile::tempdir().unwrap();
        let mut config = BackendConfig::claude();
        config.cli_path = cli;
        config.session_dir = sessions.path().to_path_buf();
        config.api_key = ApiKey::new("sk-test");
        let orch = ChatOrchestrator::new(config).await.unwrap();
        let mut req = exec("chat", &[], 5.0);
        req.response_format = WireFormat::Native;
        let resp = orch.execute(req).await.unwrap();
        assert_eq!(resp.output, ExecuteOutput::Text("sk-test\n".into()));
        assert!(orch.health().has_api_key);
    }

    #[tokio::test]
    async fn complete_chat_builds_command_and_counts_turn() {
        let f = fixture(
            r#"printf '{"content":"args:%s","usage":{"input_tokens":2,"output_tokens":3}}' "$*""#,
        )
        .await;
        let ChatOutcome::Complete(resp) = f
            .orch
            .chat(chat_request(false, WireFormat::OpenAi))
            .await
            .unwrap()
        else {
            panic!("expected a complete response");
        };
        let session_id = resp.session_id.clone().unwrap();
        assert!(resp.content.starts_with("args:chat --prompt [USER]: hi --model claude-3.5-sonnet --session "));
        assert!(resp.content.contains(&format!("--session {session_id} --format json --temperature 0.7 --top-p 1")));
        assert_eq!(resp.usage.unwrap().total_tokens, 5);
        assert_eq!(resp.finish_reason, Some(FinishReason::Stop));

        let session = f.orch.get_session(&session_id).await.unwrap();
        assert_eq!(session.message_count, 1);
    }

    #[tokio::test]
    async fn complete_chat_reuses_known_session() {
        let f = fixture("echo plain text answer").await;
        let existing = f.orch.create_session(&CreateSessionRequest::default()).await.unwrap();
        let mut req = chat_request(false, WireFormat::OpenAi);
        req.session_id = Some(existing.session_id.clone());
        let ChatOutcome::Complete(resp) = f.orch.chat(req).await.unwrap() else {
            panic!("expected a complete response");
        };
        assert_eq!(resp.content, "plain text answer");
        assert_eq!(resp.session_id, Some(existing.session_id.clone()));
        assert_eq!(f.orch.list_sessions().await.len(), 1);
    }

    #[tokio::test]
    async fn complete_chat_failure_propagates() {
        let f = fixture("echo nope >&2; exit 1").await;
        let err = f.orch.chat(chat_request(false, WireFormat::OpenAi)).await.err().unwrap();
        assert_eq!(err, GatewayError::process_failed(1, "nope"));
    }

    #[tokio::test]
    async fn streaming_openai_frames() {
        let f = fixture("echo Hel; echo lo").await;
        let frames = collect(f.orch.chat(chat_request(true, WireFormat::OpenAi)).await.unwrap()).await;
        assert_eq!(frames.len(), 4);
        let deltas: Vec<_> = frames
            .iter()
            .map(|fr| fr.data().unwrap()["choices"][0]["delta"].clone())
            .collect();
        assert_eq!(deltas[0], json!({"role": "assistant"}));
        assert_eq!(deltas[1], json!({"content": "Hel"}));
        assert_eq!(deltas[2], json!({"content": "lo"}));
        assert_eq!(deltas[3], json!({}));
        assert_eq!(frames[3].data().unwrap()["choices"][0]["finish_reason"], "stop");

        let sessions = f.orch.list_sessions().await;
        assert_eq!(sessions[0].message_count, 1);
    }

    #[tokio::test]
    async fn streaming_skips_blank_lines() {
        let f = fixture("echo Hel; echo '   '; echo; echo lo").await;
        let frames = collect(f.orch.chat(chat_request(true, WireFormat::OpenAi)).await.unwrap()).await;
        let deltas: Vec<_> = frames
            .iter()
            .map(|fr| fr.data().unwrap()["choices"][0]["delta"].clone())
            .collect();
        assert_eq!(
            deltas,
            vec![
                json!({"role": "assistant"}),
                json!({"content": "Hel"}),
                json!({"content": "lo"}),
                json!({}),
            ]
        );
    }

    #[tokio::test]
    async fn streaming_uses_text_format() {
        let f = fixture(r#"echo "$*""#).await;
        let frames = collect(f.orch.chat(chat_request(true, WireFormat::Native)).await.unwrap()).await;
        let Frame::Raw(line) = &frames[0] else {
            panic!("expected raw passthrough");
        };
        assert!(line.contains("--format text"));
    }

    #[tokio::test]
    async fn streaming_failure_becomes_error_frame() {
        let f = fixture("echo partial; echo kaput >&2; exit 3").await;
        let frames = collect(f.orch.chat(chat_request(true, WireFormat::OpenAi)).await.unwrap()).await;
        let last = frames.last().unwrap().data().unwrap();
        assert_eq!(last["choices"][0]["finish_reason"], "error");
        assert_eq!(
            last["choices"][0]["delta"]["content"],
            "[Error: Process failed with exit code 3: kaput]"
        );
        // No turn recorded for a failed stream.
        assert_eq!(f.orch.list_sessions().await[0].message_count, 0);
    }

    #[tokio::test]
    async fn streaming_claude_events() {
        let f = fixture("echo one").await;
        let frames = collect(f.orch.chat(chat_request(true, WireFormat::Claude)).await.unwrap()).await;
        let names: Vec<_> = frames.iter().filter_map(Frame::event_name).collect();
        assert_eq!(names.first(), Some(&"message_start"));
        assert_eq!(names.last(), Some(&"message_stop"));
        assert!(names.contains(&"content_block_delta"));
    }

    #[tokio::test]
    async fn streaming_timeout_mid_output() {
        let f = fixture("echo first; exec sleep 30").await;
        let mut req = chat_request(true, WireFormat::Gemini);
        req.timeout = 1.0;
        let frames = collect(f.orch.chat(req).await.unwrap()).await;
        let last = frames.last().unwrap().data().unwrap();
        assert_eq!(last["error"]["code"], 500);
        assert!(last["error"]["message"].as_str().unwrap().starts_with("Process timeout after 1 seconds"));
    }

    #[tokio::test]
    async fn dropped_stream_releases_slot() {
        let f = fixture("echo ready; exec sleep 30").await;
        let ChatOutcome::Stream(mut stream) =
            f.orch.chat(chat_request(true, WireFormat::OpenAi)).await.unwrap()
        else {
            panic!("expected a stream");
        };
        // role opener, then the first line.
        stream.next().await.unwrap();
        stream.next().await.unwrap();
        assert_eq!(f.orch.gate().available(), 1);
        drop(stream);
        assert_eq!(f.orch.gate().available(), 2);
    }

    #[tokio::test]
    async fn admission_wait_counts_toward_timeout() {
        let f = fixture("exec sleep 30").await;
        let _a = f.orch.gate().acquire().await.unwrap();
        let _b = f.orch.gate().acquire().await.unwrap();
        let started = Instant::now();
        let err = f.orch.execute(exec("chat", &[], 1.0)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn session_passthroughs() {
        let f = fixture("true").await;
        let s = f.orch.create_session(&CreateSessionRequest::default()).await.unwrap();
        assert_eq!(f.orch.get_session(&s.session_id).await, Some(s.clone()));
        assert_eq!(f.orch.cleanup_sessions(24.0).await.unwrap(), 0);
        f.orch.delete_session(&s.session_id).await.unwrap();
        assert!(matches!(
            f.orch.delete_session(&s.session_id).await,
            Err(GatewayError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn health_reports_capacity() {
        let f = fixture("true").await;
        let health = f.orch.health();
        assert_eq!(health.status, "ok");
        assert_eq!(health.backend, "claude");
        assert!(!health.has_api_key);
        assert!(health.cli_available);
        assert_eq!(health.max_concurrency, 2);
        assert_eq!(health.available_permits, 2);
    }
}
