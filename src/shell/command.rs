//! Shell command steps.
//!
//! A [`CommandStep`] runs one shell command per attempt. Standard output is
//! captured and published to the shared context under `<step>.stdout` so
//! later steps can read it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::runner::{Step, StepContext, StepError, StepOutput};

/// Error kind for a command that exited unsuccessfully.
pub const EXIT_CODE_KIND: &str = "exit_code";

/// Error kind for a command that could not be started.
pub const SPAWN_KIND: &str = "spawn";

/// Error kind for a command killed because its step token fired.
pub const CANCELLED_KIND: &str = "cancelled";

/// Result of executing a shell command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    /// Exit code (None if killed by signal).
    pub exit_code: Option<i32>,

    /// Standard output, trailing whitespace trimmed.
    pub stdout: String,

    /// Standard error, trailing whitespace trimmed.
    pub stderr: String,

    /// Execution duration.
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,

    /// Whether command succeeded (exit code 0).
    pub success: bool,
}

impl CommandResult {
    /// The last non-empty line of stderr, or of stdout if stderr is empty.
    pub fn last_line(&self) -> Option<&str> {
        [&self.stderr, &self.stdout]
            .into_iter()
            .find_map(|s| s.lines().rev().find(|l| !l.trim().is_empty()))
    }
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// A step backed by a shell command.
#[derive(Debug, Clone)]
pub struct CommandStep {
    command: String,
    cwd: Option<PathBuf>,
    env: HashMap<String, String>,
}

impl CommandStep {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            env: HashMap::new(),
        }
    }

    /// Run the command in `dir`.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Set an extra environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    fn build(&self, ctx: &StepContext) -> Command {
        let shell = detect_shell();
        let mut cmd = Command::new(&shell);
        cmd.arg(shell_flag(&shell))
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd.env("AGENTFLOW_STEP", ctx.step_id());
        cmd.env("AGENTFLOW_ATTEMPT", ctx.attempt().to_string());
        cmd
    }

    /// Run the command once, honouring the context's cancellation token.
    pub async fn execute(&self, ctx: &StepContext) -> Result<CommandResult, StepError> {
        let start = Instant::now();
        let child = self.build(ctx).spawn().map_err(|e| {
            StepError::with_kind(
                SPAWN_KIND,
                format!("failed to start '{}': {}", self.command, e),
            )
        })?;

        debug!(step = ctx.step_id(), command = %self.command, "Spawned command");

        // Dropping the wait future drops the child, which kills it.
        let output = tokio::select! {
            output = child.wait_with_output() => output.map_err(|e| {
                StepError::with_kind(SPAWN_KIND, format!("failed to wait for '{}': {}", self.command, e))
            })?,
            _ = ctx.cancellation().cancelled() => {
                return Err(StepError::with_kind(CANCELLED_KIND, "command cancelled"));
            }
        };

        Ok(CommandResult {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
            duration: start.elapsed(),
            success: output.status.success(),
        })
    }
}

#[async_trait]
impl Step for CommandStep {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, StepError> {
        let result = self.execute(&ctx).await?;

        if !result.success {
            let code = result
                .exit_code
                .map_or_else(|| "a signal".to_string(), |c| format!("code {}", c));
            let message = match result.last_line() {
                Some(line) => format!("command exited with {}: {}", code, line),
                None => format!("command exited with {}", code),
            };
            return Err(StepError::with_kind(EXIT_CODE_KIND, message));
        }

        ctx.shared().insert(
            format!("{}.stdout", ctx.step_id()),
            Value::String(result.stdout.clone()),
        );
        serde_json::to_value(&result).map_err(|e| StepError::new(e.to_string()))
    }
}

/// Detect the user's shell.
pub fn detect_shell() -> String {
    if cfg!(windows) {
        std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string())
    } else {
        std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
    }
}

/// Get the flag that makes `shell` run a command string.
///
/// Step commands run non-interactively so rc files don't add noise to
/// captured output.
pub fn shell_flag(shell: &str) -> &'static str {
    let name = shell.rsplit(['/', '\\']).next().unwrap_or(shell);
    if name.eq_ignore_ascii_case("cmd.exe") || name.eq_ignore_ascii_case("cmd") {
        "/C"
    } else {
        "-c"
    }
}
