//! CLI argument definitions.
//!
//! This module defines all CLI arguments using clap's derive macros.
//! The main entry point is the [`Cli`] struct.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::runner::ExecutionMode;

/// agentflow - dependency-aware pipeline runner for order-processing agents.
#[derive(Debug, Parser)]
#[command(name = "agentflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to config file (overrides discovery of agentflow.yml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to project root (overrides current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Minimal output (no live progress, warnings-only logging)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the pipeline (default if no command specified)
    Run(RunArgs),

    /// Show the execution plan without running anything
    Plan(PlanArgs),

    /// Validate the configuration
    Validate(ValidateArgs),

    /// Write a starter configuration
    Init(InitArgs),
}

/// Arguments for the `run` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RunArgs {
    /// Override the configured execution mode
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Override max_parallel_agents
    #[arg(long, value_name = "N")]
    pub max_parallel: Option<usize>,

    /// Disable retries and recovery
    #[arg(long)]
    pub no_recovery: bool,

    /// Print the execution report as JSON instead of a summary
    #[arg(long)]
    pub json: bool,

    /// Also write the execution report as JSON to this file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// CLI spelling of [`ExecutionMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModeArg {
    Sequential,
    Coordinated,
}

impl From<ModeArg> for ExecutionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Sequential => ExecutionMode::Sequential,
            ModeArg::Coordinated => ExecutionMode::Coordinated,
        }
    }
}

/// Arguments for the `plan` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct PlanArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `validate` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ValidateArgs {
    /// Treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for the `init` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct InitArgs {
    /// Overwrite existing configuration
    #[arg(long)]
    pub force: bool,
}
