//! Gemini Bridge - supervised Gemini CLI runs with a single JSON result.

use std::path::PathBuf;

use clap::{ArgGroup, Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gemini_bridge::bridge::{BridgeRunner, ResultEnvelope};
use gemini_bridge::cli::{ApprovalMode, GeminiCommandBuilder};
use gemini_bridge::config::{BridgeConfig, ConfigLoader};
use gemini_bridge::output::{emit_result, posix_path, resolve_output_file};
use gemini_bridge::prompt::PromptSource;
use gemini_bridge::text::escape_prompt_for_platform;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ApprovalArg {
    #[value(name = "default")]
    Default,
    #[value(name = "auto_edit")]
    AutoEdit,
    #[value(name = "yolo")]
    Yolo,
}

impl From<ApprovalArg> for ApprovalMode {
    fn from(arg: ApprovalArg) -> Self {
        match arg {
            ApprovalArg::Default => ApprovalMode::Default,
            ApprovalArg::AutoEdit => ApprovalMode::AutoEdit,
            ApprovalArg::Yolo => ApprovalMode::Yolo,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "gemini-bridge",
    about = "Run the Gemini CLI and report a single JSON result",
    version
)]
#[command(group(ArgGroup::new("prompt_input").required(true).args(["prompt", "prompt_file"])))]
struct Cli {
    /// Instruction for the task to send to gemini.
    #[arg(long = "PROMPT")]
    prompt: Option<String>,

    /// Read prompt text from this file (UTF-8).
    #[arg(long = "PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Workspace root for gemini.
    #[arg(long)]
    cd: PathBuf,

    /// Run in sandbox mode.
    #[arg(long)]
    sandbox: bool,

    /// Approval mode for the gemini session.
    #[arg(long, value_enum)]
    approval_mode: Option<ApprovalArg>,

    /// Resume this gemini session. Empty starts a new session.
    #[arg(long = "SESSION_ID", default_value = "")]
    session_id: String,

    /// Return every event from the session, not just the final reply.
    #[arg(long)]
    return_all_messages: bool,

    /// Model to use for the session.
    #[arg(long, default_value = "")]
    model: String,

    /// Also write the resulting JSON here. Relative paths go under the OS temp dir.
    #[arg(long)]
    output_file: Option<PathBuf>,

    /// Run gemini from this directory instead of --cd.
    #[arg(long)]
    gemini_cwd: Option<PathBuf>,

    /// Additional directories to include in the gemini workspace (repeatable).
    #[arg(long = "include-directories")]
    include_directories: Vec<String>,

    /// Strip a single outer Markdown code fence from the reply.
    #[arg(long, overrides_with = "no_strip_code_fences")]
    strip_code_fences: bool,

    /// Keep the reply exactly as gemini produced it.
    #[arg(long, overrides_with = "strip_code_fences")]
    no_strip_code_fences: bool,

    /// Path to a config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn strip_code_fences(&self, config: &BridgeConfig) -> bool {
        if self.no_strip_code_fences {
            false
        } else {
            self.strip_code_fences || config.strip_code_fences
        }
    }

    fn prompt_source(&self) -> Option<PromptSource> {
        match (&self.prompt_file, &self.prompt) {
            (Some(path), _) => Some(PromptSource::File(path.clone())),
            (None, Some(text)) => Some(PromptSource::Inline(text.clone())),
            (None, None) => None,
        }
    }
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(cli: &Cli) -> ResultEnvelope {
    let config = match ConfigLoader::from_flag(cli.config.clone()).load() {
        Ok(loaded) => {
            if let Some(path) = &loaded.source {
                tracing::info!(path = %path.display(), "Using config file");
            }
            loaded.config
        }
        Err(e) => return ResultEnvelope::failure(e.to_string()),
    };

    if !cli.cd.exists() {
        return ResultEnvelope::failure(format!(
            "The workspace root directory `{}` does not exist. Please check the path and try again.",
            posix_path(&cli.cd)
        ));
    }

    let Some(source) = cli.prompt_source() else {
        return ResultEnvelope::failure("One of --PROMPT or --PROMPT_FILE is required.");
    };
    let prompt = match source.load() {
        Ok(prompt) => escape_prompt_for_platform(&prompt),
        Err(e) => return ResultEnvelope::failure(e.to_string()),
    };

    let model = if cli.model.is_empty() {
        config.model.clone().unwrap_or_default()
    } else {
        cli.model.clone()
    };
    let mut builder = GeminiCommandBuilder::new(prompt)
        .sandbox(cli.sandbox)
        .model(model)
        .resume(cli.session_id.clone());

    if let Some(mode) = cli.approval_mode.map(ApprovalMode::from).or(config.approval_mode) {
        builder = builder.approval_mode(mode);
    }

    if cli.gemini_cwd.is_some() {
        builder = builder.include_directory(posix_path(&cli.cd));
    }
    for dir in &cli.include_directories {
        builder = builder.include_directory(dir.clone());
    }

    let gemini_cwd = cli.gemini_cwd.as_ref().unwrap_or(&cli.cd);
    let launch = builder
        .into_launch_spec(config.binary.clone())
        .working_dir(posix_path(gemini_cwd))
        .envs(config.env.clone());

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, stopping gemini");
                cancel.cancel();
            }
        }
    });

    tracing::info!(
        cwd = %posix_path(gemini_cwd),
        resume = !cli.session_id.is_empty(),
        "Starting gemini bridge"
    );

    BridgeRunner::new(launch)
        .timings(config.stream_timings())
        .strip_code_fences(cli.strip_code_fences(&config))
        .return_all_messages(cli.return_all_messages)
        .with_cancellation(cancel)
        .run()
        .await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output_file = resolve_output_file(cli.output_file.as_deref());
    let envelope = run(&cli).await;

    if let Err(e) = emit_result(envelope, output_file.as_deref(), &mut std::io::stdout().lock()) {
        tracing::error!(error = %e, "Failed to emit result");
        std::process::exit(1);
    }
}
