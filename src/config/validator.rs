//! Configuration validation rules.
//!
//! This module validates configuration for correctness:
//! - dependencies must reference declared steps
//! - no circular dependencies allowed
//! - a step belongs to at most one parallel group
//! - `max_parallel_agents` must be positive
//!
//! References to undeclared steps from groups, priorities or agent settings
//! are only warnings; they have no effect on the run.

use std::collections::HashMap;
use std::fmt;

use crate::config::schema::OrchestrationConfig;
use crate::error::{OrchestrationError, Result};
use crate::runner::DependencyGraph;

/// How serious a validation issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// Validation issue with context.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Rule identifier
    pub rule: String,
    /// Human-readable message
    pub message: String,
    /// Step id if the issue is step-specific
    pub step: Option<String>,
    pub severity: Severity,
}

impl ValidationIssue {
    fn error(rule: &str, message: String, step: Option<&str>) -> Self {
        Self {
            rule: rule.to_string(),
            message,
            step: step.map(str::to_string),
            severity: Severity::Error,
        }
    }

    fn warning(rule: &str, message: String, step: Option<&str>) -> Self {
        Self {
            rule: rule.to_string(),
            message,
            step: step.map(str::to_string),
            severity: Severity::Warning,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Validate a configuration and return all issues.
///
/// This function collects every issue rather than stopping at the first
/// one, so users can fix several problems at once.
pub fn validate_config(config: &OrchestrationConfig) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    issues.extend(validate_settings(config));
    issues.extend(validate_dependencies(config));
    issues.extend(validate_groups(config));
    issues.extend(validate_references(config));

    issues
}

fn validate_settings(config: &OrchestrationConfig) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if config.max_parallel_agents == 0 {
        issues.push(ValidationIssue::error(
            "zero-parallelism",
            "max_parallel_agents must be at least 1".to_string(),
            None,
        ));
    }

    if config.recovery.max_attempts == 0 {
        issues.push(ValidationIssue::warning(
            "zero-attempts",
            "recovery.max_attempts is 0; steps still run once".to_string(),
            None,
        ));
    }

    issues
}

/// Unknown dependencies, then cycles among the known ones.
fn validate_dependencies(config: &OrchestrationConfig) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut builder = DependencyGraph::builder();

    for (step, deps) in &config.dependencies {
        let mut known = Vec::with_capacity(deps.len());
        for dep in deps {
            if config.dependencies.contains_key(dep) {
                known.push(dep.clone());
            } else {
                issues.push(ValidationIssue::error(
                    "unknown-dependency",
                    format!("Step '{}' depends on '{}' which does not exist", step, dep),
                    Some(step),
                ));
            }
        }
        builder = builder.add_step(step.clone(), known);
    }

    // Unknown dependencies were filtered out above, so the build cannot
    // fail on them.
    if let Ok(graph) = builder.build() {
        if let Some(cycle) = graph.find_cycle() {
            issues.push(ValidationIssue::error(
                "circular-dependency",
                format!("Circular dependency detected: {}", cycle.join(" -> ")),
                cycle.first().map(String::as_str),
            ));
        }
    }

    issues
}

fn validate_groups(config: &OrchestrationConfig) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut seen: HashMap<&str, &str> = HashMap::new();

    for (group, members) in &config.parallel_groups {
        for member in members {
            match seen.get(member.as_str()) {
                Some(first) if *first != group.as_str() => {
                    issues.push(ValidationIssue::error(
                        "duplicate-group-member",
                        format!(
                            "Step '{}' is in parallel groups '{}' and '{}'",
                            member, first, group
                        ),
                        Some(member),
                    ));
                }
                Some(_) => {}
                None => {
                    seen.insert(member, group);
                }
            }
        }
    }

    issues
}

fn validate_references(config: &OrchestrationConfig) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let known = |id: &str| config.dependencies.contains_key(id);

    for (group, members) in &config.parallel_groups {
        for member in members.iter().filter(|m| !known(m)) {
            issues.push(ValidationIssue::warning(
                "unknown-group-step",
                format!(
                    "Parallel group '{}' lists '{}' which is not a step",
                    group, member
                ),
                Some(member),
            ));
        }
    }

    for step in config.agent_priorities.keys().filter(|s| !known(s)) {
        issues.push(ValidationIssue::warning(
            "unknown-priority-step",
            format!("Priority set for '{}' which is not a step", step),
            Some(step),
        ));
    }

    for step in config.agents.keys().filter(|s| !known(s)) {
        issues.push(ValidationIssue::warning(
            "unknown-agent",
            format!("Settings given for '{}' which is not a step", step),
            Some(step),
        ));
    }

    issues
}

/// Validate and return the warnings on success.
///
/// # Errors
///
/// Returns `ConfigValidationError` if any error-level rule fails.
pub fn validate(config: &OrchestrationConfig) -> Result<Vec<ValidationIssue>> {
    let (errors, warnings): (Vec<_>, Vec<_>) =
        validate_config(config).into_iter().partition(ValidationIssue::is_error);

    if errors.is_empty() {
        Ok(warnings)
    } else {
        let messages: Vec<_> = errors.iter().map(|e| e.message.clone()).collect();
        Err(OrchestrationError::ConfigValidationError {
            message: messages.join("; "),
        })
    }
}
