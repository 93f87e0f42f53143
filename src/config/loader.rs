//! Configuration file discovery and loading.
//!
//! Config files are YAML or JSON, chosen by extension. A project's config is
//! the first of [`CONFIG_CANDIDATES`] that exists in the project root.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::OrchestrationConfig;
use crate::error::{OrchestrationError, Result};

/// Config file names searched in the project root, in priority order.
pub const CONFIG_CANDIDATES: &[&str] = &[
    "agentflow.yml",
    "agentflow.yaml",
    "agentflow.json",
    "config/orchestration_config.json",
];

/// Serialization format of a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Pick the format from a file extension; anything but `.json` is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Find the project's config file.
pub fn discover_config(project_root: &Path) -> Option<PathBuf> {
    CONFIG_CANDIDATES
        .iter()
        .map(|name| project_root.join(name))
        .find(|path| path.is_file())
}

/// Find the project root by walking up from `start`.
///
/// The first directory containing a config file wins, then the first one
/// containing `.git`.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        if discover_config(&current).is_some() || current.join(".git").exists() {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load a single config file.
///
/// # Errors
///
/// Returns `ConfigNotFound` if the file doesn't exist.
/// Returns `ConfigParseError` if the content is invalid.
pub fn load_config_file(path: &Path) -> Result<OrchestrationConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            OrchestrationError::ConfigNotFound {
                path: path.to_path_buf(),
            }
        } else {
            OrchestrationError::Io(e)
        }
    })?;

    parse_config(&content, path)
}

/// Parse config content; the format follows `source_path`'s extension.
pub fn parse_config(content: &str, source_path: &Path) -> Result<OrchestrationConfig> {
    let parsed = match ConfigFormat::from_path(source_path) {
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
    };

    parsed.map_err(|message| OrchestrationError::ConfigParseError {
        path: source_path.to_path_buf(),
        message,
    })
}

/// Load config with optional path override.
///
/// If `config_override` is provided it is loaded directly (relative paths
/// resolve against `project_root`). Otherwise the project root is searched.
///
/// # Errors
///
/// Returns `ConfigNotFound` if no config file exists.
pub fn load_config(
    project_root: &Path,
    config_override: Option<&Path>,
) -> Result<(PathBuf, OrchestrationConfig)> {
    let path = match config_override {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => project_root.join(path),
        None => discover_config(project_root).ok_or_else(|| OrchestrationError::ConfigNotFound {
            path: project_root.join(CONFIG_CANDIDATES[0]),
        })?,
    };

    let config = load_config_file(&path)?;
    Ok((path, config))
}
