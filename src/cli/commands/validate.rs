//! Validate command implementation.
//!
//! The `agentflow validate` command reports every configuration issue
//! at once instead of stopping at the first.

use crate::cli::args::ValidateArgs;
use crate::config::validate_config;
use crate::error::Result;
use crate::ui::StatusKind;

use super::dispatcher::{Command, CommandContext, CommandResult, EXIT_FAILURE};

/// The validate command implementation.
pub struct ValidateCommand {
    args: ValidateArgs,
}

impl ValidateCommand {
    /// Create a new validate command.
    pub fn new(args: ValidateArgs) -> Self {
        Self { args }
    }
}

#[async_trait::async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<CommandResult> {
        let (path, config) = ctx.load_config()?;
        let issues = validate_config(&config);
        let renderer = ctx.renderer();

        print!("{}", renderer.issues(&issues));

        let errors = issues.iter().filter(|i| i.is_error()).count();
        let warnings = issues.len() - errors;
        let failed = errors > 0 || (self.args.strict && warnings > 0);

        let summary = format!(
            "{}: {} steps, {} errors, {} warnings",
            path.display(),
            config.step_ids().len(),
            errors,
            warnings
        );
        let kind = if failed {
            StatusKind::Failed
        } else if warnings > 0 {
            StatusKind::Warning
        } else {
            StatusKind::Success
        };
        if ctx.colors {
            println!("{}", kind.format(renderer.theme(), &summary));
        } else {
            println!("{}", kind.format_plain(&summary));
        }

        Ok(if failed {
            CommandResult::failure(EXIT_FAILURE)
        } else {
            CommandResult::success()
        })
    }
}
