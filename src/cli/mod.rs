//! Command-line interface for agentflow.
//!
//! This module provides the CLI argument parsing using clap's derive macros
//! and command implementations.
//!
//! # Architecture
//!
//! - [`args`] - Argument definitions using clap derive macros
//! - [`commands`] - Command implementations

pub mod args;
pub mod commands;

pub use args::{Cli, Commands, InitArgs, ModeArg, PlanArgs, RunArgs, ValidateArgs};
pub use commands::{
    Command, CommandContext, CommandDispatcher, CommandResult, EXIT_CANCELLED, EXIT_CONFIG,
    EXIT_FAILURE,
};
