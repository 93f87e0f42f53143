//! CLI command implementations.
//!
//! Each command implements the [`Command`] trait, which provides a uniform
//! interface for executing commands and reporting results.
//!
//! # Architecture
//!
//! Commands are dispatched via [`CommandDispatcher`], which routes CLI
//! subcommands to their implementations. This allows:
//! - Single binary with subcommands (`agentflow run`, `agentflow plan`)
//! - Shared config loading and output settings via [`CommandContext`]
//! - Consistent exit codes

pub mod dispatcher;
pub mod init;
pub mod plan;
pub mod run;
pub mod validate;

pub use dispatcher::{
    Command, CommandContext, CommandDispatcher, CommandResult, EXIT_CANCELLED, EXIT_CONFIG,
    EXIT_FAILURE,
};
