//! agentflow CLI entry point.

use std::process::ExitCode;

use agentflow::cli::{Cli, CommandContext, CommandDispatcher, Commands, EXIT_CONFIG, EXIT_FAILURE};
use agentflow::config::find_project_root;
use agentflow::ui::{should_use_colors, Theme};
use agentflow::OrchestrationError;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber for logging.
///
/// Log level is controlled by:
/// 1. `--debug` flag sets level to DEBUG
/// 2. `RUST_LOG` environment variable (if set)
/// 3. `--quiet` sets WARN, otherwise INFO
///
/// Logs go to stderr so that `--json` output stays parseable.
fn init_tracing(debug: bool, quiet: bool) {
    let filter = if debug {
        EnvFilter::new("agentflow=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if quiet { "agentflow=warn" } else { "agentflow=info" })
        })
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug, cli.quiet);

    tracing::debug!("agentflow starting with args: {:?}", cli);

    // Handle --no-color
    let colors = !cli.no_color && should_use_colors();

    // Determine project root; init always targets the current directory
    let cwd = std::env::current_dir().unwrap_or_default();
    let project_root = match (&cli.project, &cli.command) {
        (Some(project), _) => project.clone(),
        (None, Some(Commands::Init(_))) => cwd,
        (None, _) => find_project_root(&cwd).unwrap_or(cwd),
    };

    let mut context = CommandContext::new(project_root);
    context.config_path = cli.config.clone();
    context.colors = colors;
    context.quiet = cli.quiet;

    let cancel = context.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, letting running steps finish");
            cancel.cancel();
        }
    });

    let dispatcher = CommandDispatcher::new(context);

    match dispatcher.dispatch(&cli).await {
        Ok(result) => ExitCode::from(result.exit_code as u8),
        Err(e) => {
            let theme = Theme::for_output(colors);
            eprintln!("{} {}", theme.error.apply_to("Error:"), e);
            if matches!(e, OrchestrationError::ConfigNotFound { .. }) {
                eprintln!("Run 'agentflow init' to create one.");
            }
            let code = if e.is_configuration() {
                EXIT_CONFIG
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code as u8)
        }
    }
}
