//! Shell command execution.

pub mod command;

pub use command::{
    detect_shell, shell_flag, CommandResult, CommandStep, CANCELLED_KIND, EXIT_CODE_KIND,
    SPAWN_KIND,
};
