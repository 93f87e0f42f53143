//! Command dispatching.
//!
//! This module provides the core command infrastructure:
//! - [`Command`] trait for implementing commands
//! - [`CommandContext`] with the options every command shares
//! - [`CommandResult`] for uniform result reporting
//! - [`CommandDispatcher`] for routing CLI subcommands

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cli::args::{Cli, Commands, RunArgs};
use crate::config::{load_config, OrchestrationConfig};
use crate::error::Result;
use crate::ui::Renderer;

/// Exit code for a failed run or invalid configuration.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for a pipeline definition that cannot be built.
pub const EXIT_CONFIG: i32 = 2;

/// Exit code for a run cancelled by the user.
pub const EXIT_CANCELLED: i32 = 130;

/// Trait for command implementations.
///
/// Each CLI subcommand implements this trait to provide its execution logic.
#[async_trait]
pub trait Command {
    /// Execute the command.
    ///
    /// # Returns
    ///
    /// A [`CommandResult`] indicating success/failure and exit code.
    async fn execute(&self, ctx: &CommandContext) -> Result<CommandResult>;
}

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult {
    /// Whether the command succeeded.
    pub success: bool,

    /// Exit code to use (0 for success, non-zero for failure).
    pub exit_code: i32,
}

impl CommandResult {
    /// Create a successful result.
    pub fn success() -> Self {
        Self {
            success: true,
            exit_code: 0,
        }
    }

    /// Create a failure result.
    pub fn failure(exit_code: i32) -> Self {
        Self {
            success: false,
            exit_code,
        }
    }
}

/// Options shared by every command.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub project_root: PathBuf,
    /// Explicit config file, relative to `project_root` unless absolute.
    pub config_path: Option<PathBuf>,
    pub colors: bool,
    pub quiet: bool,
    /// Cancelled on Ctrl-C.
    pub cancel: CancellationToken,
}

impl CommandContext {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            config_path: None,
            colors: false,
            quiet: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Load the project's configuration.
    pub fn load_config(&self) -> Result<(PathBuf, OrchestrationConfig)> {
        load_config(&self.project_root, self.config_path.as_deref())
    }

    pub fn renderer(&self) -> Renderer {
        Renderer::new(self.colors)
    }
}

/// Dispatches CLI commands to their implementations.
pub struct CommandDispatcher {
    context: CommandContext,
}

impl CommandDispatcher {
    /// Create a new dispatcher for the given context.
    pub fn new(context: CommandContext) -> Self {
        Self { context }
    }

    /// Get the project root path.
    pub fn project_root(&self) -> &Path {
        &self.context.project_root
    }

    /// Dispatch and execute a command.
    ///
    /// Routes the CLI subcommand to the appropriate command implementation
    /// and executes it. No subcommand means `run` with default arguments.
    pub async fn dispatch(&self, cli: &Cli) -> Result<CommandResult> {
        let ctx = &self.context;
        match &cli.command {
            Some(Commands::Run(args)) => super::run::RunCommand::new(args.clone()).execute(ctx).await,
            Some(Commands::Plan(args)) => {
                super::plan::PlanCommand::new(args.clone()).execute(ctx).await
            }
            Some(Commands::Validate(args)) => {
                super::validate::ValidateCommand::new(args.clone())
                    .execute(ctx)
                    .await
            }
            Some(Commands::Init(args)) => {
                super::init::InitCommand::new(args.clone()).execute(ctx).await
            }
            None => {
                super::run::RunCommand::new(RunArgs::default())
                    .execute(ctx)
                    .await
            }
        }
    }
}
