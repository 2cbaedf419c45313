use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use cligate_core::config::{parse_allowed_commands, BackendConfig, BackendKind};
use cligate_core::security::ApiKey;
use cligate_engine::ChatOrchestrator;
use cligate_server::{AppState, ServerConfig};
use cligate_telemetry::{init_telemetry, parse_level, TelemetryConfig};

/// HTTP gateway in front of the Claude and Gemini command-line tools.
#[derive(Debug, Parser)]
#[command(name = "cligate", version)]
struct Args {
    #[arg(long, env = "CLIGATE_HOST", default_value = "0.0.0.0")]
    host: String,
    #[arg(long, env = "CLIGATE_PORT", default_value_t = 8000)]
    port: u16,
    #[arg(long, env = "CLIGATE_LOG_LEVEL", default_value = "info")]
    log_level: String,
    #[arg(long, env = "CLIGATE_LOG_JSON")]
    log_json: bool,

    #[arg(long, env = "CLAUDE_API_KEY", default_value = "", hide_env_values = true)]
    claude_api_key: String,
    #[arg(long, env = "CLAUDE_CLI_PATH", default_value = "claude")]
    claude_cli_path: String,
    #[arg(long, env = "CLAUDE_CLI_MAX_CONCURRENCY", default_value_t = 10)]
    claude_max_concurrency: usize,
    #[arg(long, env = "CLAUDE_CLI_TIMEOUT", default_value_t = 300)]
    claude_timeout: u64,
    #[arg(long, env = "CLAUDE_CLI_SESSION_DIR", default_value = "data/claude_sessions")]
    claude_session_dir: PathBuf,
    #[arg(
        long,
        env = "CLAUDE_CLI_ALLOWED_COMMANDS",
        default_value = "chat,ask,code,explain,fix,test,review"
    )]
    claude_allowed_commands: String,
    #[arg(long, env = "CLAUDE_OPTIMIZE_SYSTEM_PROMPT")]
    claude_optimize_system_prompt: bool,

    #[arg(long, env = "GEMINI_API_KEY", default_value = "", hide_env_values = true)]
    gemini_api_key: String,
    #[arg(long, env = "GEMINI_CLI_PATH", default_value = "gemini")]
    gemini_cli_path: String,
    #[arg(long, env = "GEMINI_CLI_MAX_CONCURRENCY", default_value_t = 10)]
    gemini_max_concurrency: usize,
    #[arg(long, env = "GEMINI_CLI_TIMEOUT", default_value_t = 300)]
    gemini_timeout: u64,
    #[arg(long, env = "GEMINI_CLI_SESSION_DIR", default_value = "data/gemini_sessions")]
    gemini_session_dir: PathBuf,
    #[arg(
        long,
        env = "GEMINI_CLI_ALLOWED_COMMANDS",
        default_value = "chat,ask,code,explain,fix,test"
    )]
    gemini_allowed_commands: String,
}

impl Args {
    fn claude(&self) -> BackendConfig {
        BackendConfig {
            api_key: ApiKey::new(self.claude_api_key.clone()),
            cli_path: self.claude_cli_path.clone(),
            max_concurrency: self.claude_max_concurrency,
            default_timeout: Duration::from_secs(self.claude_timeout),
            session_dir: self.claude_session_dir.clone(),
            allowed_commands: parse_allowed_commands(&self.claude_allowed_commands),
            optimize_system_prompt: self.claude_optimize_system_prompt,
            ..BackendConfig::new(BackendKind::Claude)
        }
    }

    fn gemini(&self) -> BackendConfig {
        BackendConfig {
            api_key: ApiKey::new(self.gemini_api_key.clone()),
            cli_path: self.gemini_cli_path.clone(),
            max_concurrency: self.gemini_max_concurrency,
            default_timeout: Duration::from_secs(self.gemini_timeout),
            session_dir: self.gemini_session_dir.clone(),
            allowed_commands: parse_allowed_commands(&self.gemini_allowed_commands),
            ..BackendConfig::new(BackendKind::Gemini)
        }
    }
}

async fn orchestrator(config: BackendConfig) -> anyhow::Result<Arc<ChatOrchestrator>> {
    let name = config.kind.name();
    config
        .validate()
        .with_context(|| format!("invalid {name} configuration"))?;
    if !config.api_key.is_configured() {
        tracing::warn!(backend = name, env = config.kind.api_key_env(), "no API key configured");
    }
    let orch = ChatOrchestrator::new(config)
        .await
        .with_context(|| format!("failed to open {name} session store"))?;
    Ok(Arc::new(orch))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_telemetry(&TelemetryConfig {
        log_level: parse_level(&args.log_level),
        json: args.log_json,
        ..Default::default()
    });

    tracing::info!("Starting cligate");

    let state = AppState {
        claude: orchestrator(args.claude()).await?,
        gemini: orchestrator(args.gemini()).await?,
    };

    let config = ServerConfig {
        host: args.host.clone(),
        port: args.port,
        ..Default::default()
    };
    let handle = cligate_server::start(config, state)
        .await
        .context("failed to start server")?;

    tracing::info!(port = handle.port, "cligate ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("Shutting down");
    Ok(())
}
