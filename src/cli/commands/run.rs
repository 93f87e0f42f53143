//! Run command implementation.
//!
//! The `agentflow run` command executes the configured pipeline, binding
//! every step to the shell command in `agents.<id>.command`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::cli::args::RunArgs;
use crate::config::{validate, OrchestrationConfig};
use crate::error::{OrchestrationError, Result};
use crate::runner::{Orchestrator, OrchestratorBuilder, RunStatus, SharedContext};
use crate::shell::CommandStep;
use crate::ui::ProgressListener;

use super::dispatcher::{
    Command, CommandContext, CommandResult, EXIT_CANCELLED, EXIT_FAILURE,
};

/// The run command implementation.
pub struct RunCommand {
    args: RunArgs,
}

impl RunCommand {
    /// Create a new run command.
    pub fn new(args: RunArgs) -> Self {
        Self { args }
    }

    /// Get the command arguments.
    pub fn args(&self) -> &RunArgs {
        &self.args
    }

    /// Apply command-line overrides on top of the loaded config.
    fn apply_overrides(&self, config: &mut OrchestrationConfig) {
        if let Some(mode) = self.args.mode {
            config.execution_mode = mode.into();
        }
        if let Some(limit) = self.args.max_parallel {
            config.max_parallel_agents = limit;
        }
        if self.args.no_recovery {
            config.enable_error_recovery = false;
        }
    }
}

/// Bind each configured step to its shell command.
///
/// Commands run in `project_root`.
///
/// # Errors
///
/// `ConfigValidationError` naming every step without a command.
pub fn command_pipeline(
    config: OrchestrationConfig,
    project_root: &Path,
) -> Result<OrchestratorBuilder> {
    let mut missing = Vec::new();
    let mut builder = Orchestrator::builder();

    for id in config.step_ids() {
        match config.agent(id).command {
            Some(command) => {
                builder = builder.step(id, CommandStep::new(command).current_dir(project_root));
            }
            None => missing.push(format!("Step '{}' has no command (agents.{}.command)", id, id)),
        }
    }

    if !missing.is_empty() {
        return Err(OrchestrationError::ConfigValidationError {
            message: missing.join("; "),
        });
    }

    Ok(builder.config(config))
}

/// Exit code for a finished run.
pub fn exit_code(status: RunStatus) -> i32 {
    match status {
        RunStatus::Completed | RunStatus::CompletedWithRecoveries => 0,
        RunStatus::Failed => EXIT_FAILURE,
        RunStatus::Cancelled => EXIT_CANCELLED,
    }
}

#[async_trait::async_trait]
impl Command for RunCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<CommandResult> {
        let (path, mut config) = ctx.load_config()?;
        self.apply_overrides(&mut config);

        let renderer = ctx.renderer();
        let warnings = validate(&config)?;
        if !warnings.is_empty() && !ctx.quiet {
            eprint!("{}", renderer.issues(&warnings));
        }

        let mut builder = command_pipeline(config, &ctx.project_root)?;
        if !ctx.quiet && !self.args.json {
            builder = builder.listener(Arc::new(ProgressListener::new(ctx.colors)));
        }
        let orchestrator = builder.build()?;

        info!(
            config = %path.display(),
            steps = orchestrator.plan().len(),
            "Loaded pipeline"
        );

        let report = orchestrator
            .run(SharedContext::new(), ctx.cancel.clone())
            .await;
        if let Some(err) = report.failure() {
            warn!("{}", err);
        }

        if self.args.json || self.args.output.is_some() {
            let json = report.to_json().map_err(anyhow::Error::from)?;
            if let Some(output) = &self.args.output {
                fs::write(output, &json)?;
                info!(path = %output.display(), "Wrote execution report");
            }
            if self.args.json {
                println!("{}", json);
            }
        }
        if !self.args.json {
            print!("{}", renderer.report(&report));
        }

        let code = exit_code(report.status);
        Ok(if code == 0 {
            CommandResult::success()
        } else {
            CommandResult::failure(code)
        })
    }
}
