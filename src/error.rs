//! Error types for agentflow operations.
//!
//! This module defines [`OrchestrationError`], the primary error type used
//! throughout the crate, and a [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Configuration problems (duplicate, unknown, missing or cyclic steps and
//!   unreadable config files) are fatal and surface before any step runs
//! - Step failures inside a run are [`StepError`](crate::runner::StepError)
//!   values recorded in the report, never an `OrchestrationError`
//! - Use `anyhow::Error` (via `OrchestrationError::Other`) for unexpected errors

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for agentflow operations.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// A step with the same id is already registered.
    #[error("Step '{id}' is already registered")]
    DuplicateStep { id: String },

    /// No step with this id is registered.
    #[error("Unknown step: {id}")]
    UnknownStep { id: String },

    /// A step depends on an id that is not registered.
    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    MissingDependency { step: String, dependency: String },

    /// Step dependency cycle detected.
    #[error("Circular dependency detected: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// Configuration file not found at expected location.
    #[error("Configuration not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Failed to parse configuration file.
    #[error("Failed to parse config at {path}: {message}")]
    ConfigParseError { path: PathBuf, message: String },

    /// Invalid configuration structure or values.
    #[error("Invalid configuration: {message}")]
    ConfigValidationError { message: String },

    /// Step execution failed.
    #[error("Step '{step}' failed: {message}")]
    StepExecution { step: String, message: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OrchestrationError {
    /// Whether this error describes a bad pipeline definition.
    ///
    /// Configuration errors abort a run before scheduling begins.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::DuplicateStep { .. }
                | Self::UnknownStep { .. }
                | Self::MissingDependency { .. }
                | Self::CyclicDependency { .. }
                | Self::ConfigNotFound { .. }
                | Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
        )
    }
}

/// Result type alias for agentflow operations.
pub type Result<T> = std::result::Result<T, OrchestrationError>;
