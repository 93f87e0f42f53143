//! Configuration loading, parsing, and validation for agentflow.
//!
//! This module handles all aspects of configuration:
//! - Schema definitions in [`schema`]
//! - File discovery and loading in [`loader`]
//! - Validation in [`validator`]
//! - The `init` starter file in [`template`]
//!
//! # Example
//!
//! ```
//! use agentflow::config::{load_config, validate};
//! use tempfile::TempDir;
//! use std::fs;
//!
//! let temp = TempDir::new().unwrap();
//! fs::write(
//!     temp.path().join("agentflow.yml"),
//!     "dependencies:\n  po_reader: []\n  validation: [po_reader]\n",
//! )
//! .unwrap();
//!
//! let (_, config) = load_config(temp.path(), None).unwrap();
//! validate(&config).unwrap();
//! assert_eq!(config.step_ids(), vec!["po_reader", "validation"]);
//! ```

pub mod loader;
pub mod schema;
pub mod template;
pub mod validator;

pub use loader::{
    discover_config, find_project_root, load_config, load_config_file, parse_config,
    ConfigFormat, CONFIG_CANDIDATES,
};
pub use schema::{AgentSettings, OrchestrationConfig, RecoverySettings};
pub use template::{STARTER_CONFIG, STARTER_FILE};
pub use validator::{validate, validate_config, Severity, ValidationIssue};
