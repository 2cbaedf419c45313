use cligate_core::ids::SessionId;

/// Value of the CLI's `--format` flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Text,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
        }
    }
}

const CHAT_SUBCOMMAND: &str = "chat";

/// Assembles the argv for one chat invocation. Secrets never go here; they
/// reach the child through its environment.
#[derive(Clone, Debug)]
pub struct CommandBuilder {
    cli_path: String,
    prompt: String,
    model: Option<String>,
    session_id: Option<SessionId>,
    include_tools: bool,
    output_format: OutputFormat,
    extra_args: Vec<String>,
}

impl CommandBuilder {
    pub fn new(cli_path: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            cli_path: cli_path.into(),
            prompt: prompt.into(),
            model: None,
            session_id: None,
            include_tools: false,
            output_format: OutputFormat::Json,
            extra_args: Vec::new(),
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.model = (!model.is_empty()).then_some(model);
        self
    }

    pub fn session(mut self, id: SessionId) -> Self {
        self.session_id = Some(id);
        self
    }

    pub fn include_tools(mut self, enabled: bool) -> Self {
        self.include_tools = enabled;
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Sampling flags, appended only when set.
    pub fn sampling(mut self, temperature: Option<f64>, top_p: Option<f64>) -> Self {
        if let Some(t) = temperature {
            self.extra_args.extend(["--temperature".to_string(), t.to_string()]);
        }
        if let Some(p) = top_p {
            self.extra_args.extend(["--top-p".to_string(), p.to_string()]);
        }
        self
    }

    pub fn build(self) -> Vec<String> {
        let mut argv = vec![
            self.cli_path,
            CHAT_SUBCOMMAND.to_string(),
            "--prompt".to_string(),
            self.prompt,
        ];
        if let Some(model) = self.model {
            argv.extend(["--model".to_string(), model]);
        }
        if let Some(id) = self.session_id {
            argv.extend(["--session".to_string(), id.to_string()]);
        }
        if self.include_tools {
            argv.push("--tools".to_string());
        }
        argv.extend(["--format".to_string(), self.output_format.as_str().to_string()]);
        argv.extend(self.extra_args);
        argv
    }
}

/// argv for a one-shot allow-listed command: `[cli, command, args...]`.
pub fn execute_argv(cli_path: &str, command: &str, args: &[String]) -> Vec<String> {
    let mut argv = Vec::with_capacity(args.len() + 2);
    argv.push(cli_path.to_string());
    argv.push(command.to_string());
    argv.extend(args.iter().cloned());
    argv
}
