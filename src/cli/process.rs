//! Gemini CLI command construction and launch configuration.
//!
//! [`GeminiCommandBuilder`] turns bridge options into the Gemini argument
//! vector, and [`LaunchSpec`] carries everything needed to start the child:
//! program, arguments, working directory and environment overrides.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// Environment overrides that force UTF-8 text I/O in the child.
pub const UTF8_ENV: &[(&str, &str)] = &[("PYTHONIOENCODING", "utf-8"), ("PYTHONUTF8", "1")];

/// Default Gemini executable name.
pub const DEFAULT_BINARY: &str = "gemini";

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The executable was not found.
    #[error("executable not found: {0}")]
    NotFound(String),
    /// Permission denied when spawning.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    pub(crate) fn from_io(program: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(program.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(program.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// Gemini approval mode for tool calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    Default,
    AutoEdit,
    Yolo,
}

impl ApprovalMode {
    /// The value passed to `--approval-mode`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AutoEdit => "auto_edit",
            Self::Yolo => "yolo",
        }
    }
}

/// Builder for configuring Gemini CLI arguments.
#[derive(Debug, Clone, Default)]
pub struct GeminiCommandBuilder {
    prompt: String,
    sandbox: bool,
    approval_mode: Option<ApprovalMode>,
    model: Option<String>,
    resume_session: Option<String>,
    include_directories: Vec<String>,
}

impl GeminiCommandBuilder {
    /// Create a new builder with the given prompt.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Run Gemini in sandbox mode.
    #[must_use]
    pub fn sandbox(mut self, enabled: bool) -> Self {
        self.sandbox = enabled;
        self
    }

    /// Set the approval mode.
    #[must_use]
    pub fn approval_mode(mut self, mode: ApprovalMode) -> Self {
        self.approval_mode = Some(mode);
        self
    }

    /// Set the model. Empty names are ignored.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.model = (!model.is_empty()).then_some(model);
        self
    }

    /// Resume an existing session. Empty ids start a new session.
    #[must_use]
    pub fn resume(mut self, session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        self.resume_session = (!session_id.is_empty()).then_some(session_id);
        self
    }

    /// Add a directory to the Gemini workspace.
    #[must_use]
    pub fn include_directory(mut self, dir: impl Into<String>) -> Self {
        self.include_directories.push(dir.into());
        self
    }

    /// Build the command-line arguments (without the program name).
    #[must_use]
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec!["-o".to_string(), "stream-json".to_string()];

        if self.sandbox {
            args.push("--sandbox".to_string());
        }

        if let Some(mode) = self.approval_mode {
            args.push("--approval-mode".to_string());
            args.push(mode.as_str().to_string());
        }

        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        if let Some(session_id) = &self.resume_session {
            args.push("--resume".to_string());
            args.push(session_id.clone());
        }

        for dir in &self.include_directories {
            args.push("--include-directories".to_string());
            args.push(dir.clone());
        }

        args.push(self.prompt.clone());
        args
    }

    /// Turn the builder into a launch spec for the given executable.
    #[must_use]
    pub fn into_launch_spec(self, binary: impl Into<String>) -> LaunchSpec {
        LaunchSpec::new(binary).args(self.build_args())
    }
}

/// Everything needed to start the child process.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
}

impl LaunchSpec {
    /// Create a launch spec for a program, with the UTF-8 overrides applied.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: UTF8_ENV
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory for the child.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment override.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add several environment overrides.
    #[must_use]
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// The program as given.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The arguments after the program.
    #[must_use]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Get the working directory, if set.
    #[must_use]
    pub fn get_working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Environment overrides applied on top of the inherited environment.
    #[must_use]
    pub fn get_env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Resolve the program through `PATH`, falling back to the literal value.
    #[must_use]
    pub fn resolved_program(&self) -> PathBuf {
        which::which(&self.program).unwrap_or_else(|_| PathBuf::from(&self.program))
    }

    /// Shell-quoted command line, for logging.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|part| shell_escape::escape(Cow::Borrowed(part.as_str())).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Build the tokio command. Output handles are left for the caller.
    pub(crate) fn command(&self) -> Command {
        let mut cmd = Command::new(self.resolved_program());
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        cmd
    }
}
