//! Init command implementation.
//!
//! The `agentflow init` command writes a starter pipeline configuration.

use std::fs;
use std::path::PathBuf;

use tracing::info;

use crate::cli::args::InitArgs;
use crate::config::{discover_config, STARTER_CONFIG, STARTER_FILE};
use crate::error::Result;
use crate::ui::StatusKind;

use super::dispatcher::{Command, CommandContext, CommandResult, EXIT_FAILURE};

/// The init command implementation.
pub struct InitCommand {
    args: InitArgs,
}

impl InitCommand {
    /// Create a new init command.
    pub fn new(args: InitArgs) -> Self {
        Self { args }
    }

    /// Get the command arguments.
    pub fn args(&self) -> &InitArgs {
        &self.args
    }

    /// Where the starter config goes.
    fn target(ctx: &CommandContext) -> PathBuf {
        match &ctx.config_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => ctx.project_root.join(path),
            None => ctx.project_root.join(STARTER_FILE),
        }
    }
}

#[async_trait::async_trait]
impl Command for InitCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<CommandResult> {
        let target = Self::target(ctx);
        let renderer = ctx.renderer();
        let line = |kind: StatusKind, msg: &str| {
            if ctx.colors {
                kind.format(renderer.theme(), msg)
            } else {
                kind.format_plain(msg)
            }
        };

        let existing = if ctx.config_path.is_some() {
            target.exists().then(|| target.clone())
        } else {
            discover_config(&ctx.project_root)
        };
        if let Some(existing) = existing {
            if !self.args.force {
                eprintln!(
                    "{}",
                    line(
                        StatusKind::Failed,
                        &format!(
                            "Configuration already exists at {} (use --force to overwrite)",
                            existing.display()
                        )
                    )
                );
                return Ok(CommandResult::failure(EXIT_FAILURE));
            }
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, STARTER_CONFIG)?;
        info!(path = %target.display(), "Wrote starter configuration");

        if !ctx.quiet {
            println!(
                "{}",
                line(
                    StatusKind::Success,
                    &format!("Created {}", target.display())
                )
            );
            println!("  Edit the agent commands, then run `agentflow plan` to check the waves.");
        }

        Ok(CommandResult::success())
    }
}
