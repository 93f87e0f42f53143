//! Configuration schema definitions for agentflow.
//!
//! These structs map to the YAML (or JSON) pipeline configuration file.
//! Maps are `BTreeMap`s so that steps declared in a config file are
//! registered in a stable order.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::runner::{
    Backoff, DefaultRecoveryPolicy, ExecutionMode, MonitorLevel, SchedulerConfig,
    DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS,
};

/// Root configuration structure for `agentflow.yml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Pipeline name (for display purposes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// `sequential` or `coordinated`
    pub execution_mode: ExecutionMode,

    /// Maximum steps running at once
    #[serde(default = "default_max_parallel")]
    pub max_parallel_agents: usize,

    /// Allow the recovery policy to retry or recover failed steps
    #[serde(default = "default_true")]
    pub enable_error_recovery: bool,

    /// Record timestamps, durations and retry history
    #[serde(default = "default_true")]
    pub enable_monitoring: bool,

    /// Run each parallel group of a wave on its own
    #[serde(default, skip_serializing_if = "is_false")]
    pub isolate_ungrouped: bool,

    /// Fallback step timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_timeout: Option<u64>,

    /// Step id -> ids it depends on. Every key is a step of the pipeline.
    pub dependencies: BTreeMap<String, Vec<String>>,

    /// Group name -> step ids that may run side by side
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parallel_groups: BTreeMap<String, Vec<String>>,

    /// Step id -> priority (higher first)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub agent_priorities: BTreeMap<String, i64>,

    /// Per-step settings
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub agents: BTreeMap<String, AgentSettings>,

    /// Default recovery policy
    pub recovery: RecoverySettings,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            name: None,
            execution_mode: ExecutionMode::default(),
            max_parallel_agents: default_max_parallel(),
            enable_error_recovery: true,
            enable_monitoring: true,
            isolate_ungrouped: false,
            default_timeout: None,
            dependencies: BTreeMap::new(),
            parallel_groups: BTreeMap::new(),
            agent_priorities: BTreeMap::new(),
            agents: BTreeMap::new(),
            recovery: RecoverySettings::default(),
        }
    }
}

impl OrchestrationConfig {
    /// The purchase-order to sales-order pipeline.
    pub fn po_to_so() -> Self {
        let deps = |ids: &[&str]| ids.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let mut config = Self {
            name: Some("po-to-so".to_string()),
            ..Self::default()
        };
        config.dependencies.insert("po_reader".into(), deps(&[]));
        config
            .dependencies
            .insert("validation".into(), deps(&["po_reader"]));
        config
            .dependencies
            .insert("exception_response".into(), deps(&["validation"]));
        config
            .dependencies
            .insert("so_creator".into(), deps(&["validation"]));
        config.dependencies.insert(
            "summary_insights".into(),
            deps(&["exception_response", "so_creator"]),
        );
        config.parallel_groups.insert(
            "post_validation".into(),
            deps(&["exception_response", "so_creator"]),
        );
        for (id, priority) in [
            ("po_reader", 100),
            ("validation", 90),
            ("exception_response", 80),
            ("so_creator", 80),
            ("summary_insights", 70),
        ] {
            config.agent_priorities.insert(id.into(), priority);
        }
        config
    }

    /// Step ids declared by this config, in registration order.
    pub fn step_ids(&self) -> Vec<&str> {
        self.dependencies.keys().map(String::as_str).collect()
    }

    /// The parallel group a step belongs to, if any.
    ///
    /// Returns the first group (by name) when a step is listed in several;
    /// the validator reports that case as an error.
    pub fn group_of(&self, step: &str) -> Option<&str> {
        self.parallel_groups
            .iter()
            .find(|(_, members)| members.iter().any(|m| m == step))
            .map(|(name, _)| name.as_str())
    }

    pub fn priority_of(&self, step: &str) -> i64 {
        self.agent_priorities.get(step).copied().unwrap_or(0)
    }

    /// Settings for a step, defaulted when absent.
    pub fn agent(&self, step: &str) -> AgentSettings {
        self.agents.get(step).cloned().unwrap_or_default()
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            concurrency_limit: self.max_parallel_agents,
            mode: self.execution_mode,
            error_recovery: self.enable_error_recovery,
            default_timeout: self.default_timeout.map(Duration::from_secs),
            group_isolation: self.isolate_ungrouped,
        }
    }

    pub fn monitor_level(&self) -> MonitorLevel {
        if self.enable_monitoring {
            MonitorLevel::Detailed
        } else {
            MonitorLevel::Minimal
        }
    }

    /// Build the default recovery policy from the `recovery` section.
    pub fn recovery_policy(&self) -> DefaultRecoveryPolicy {
        let r = &self.recovery;
        let mut policy = DefaultRecoveryPolicy::new()
            .with_max_attempts(r.max_attempts)
            .with_backoff(Backoff {
                initial: Duration::from_millis(r.backoff_ms),
                multiplier: r.backoff_multiplier,
                max: Duration::from_millis(r.max_backoff_ms),
            });
        for kind in &r.recover_kinds {
            policy = policy.recover_on(kind.clone());
        }
        for kind in &r.fatal_kinds {
            policy = policy.fatal_on(kind.clone());
        }
        policy
    }
}

/// Per-step settings under `agents.<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Run this step at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Step timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Retries after the first attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,

    /// A failure of this step does not fail the run
    #[serde(skip_serializing_if = "is_false")]
    pub optional: bool,

    /// A failure of this step aborts the run
    #[serde(skip_serializing_if = "is_false")]
    pub critical: bool,

    /// Shell command run by the CLI for this step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: None,
            retry_count: None,
            optional: false,
            critical: false,
            command: None,
        }
    }
}

impl AgentSettings {
    /// Total attempts implied by `retry_count`.
    pub fn max_attempts(&self) -> Option<u32> {
        self.retry_count.map(|n| n.saturating_add(1))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

/// The `recovery` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    /// Total attempts per step, including the first
    pub max_attempts: u32,

    /// Delay before the first retry
    pub backoff_ms: u64,

    /// Growth factor per further retry
    pub backoff_multiplier: f64,

    /// Cap on a single delay
    pub max_backoff_ms: u64,

    /// Error kinds treated as recovered without retrying
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recover_kinds: Vec<String>,

    /// Error kinds that are never retried
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fatal_kinds: Vec<String>,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        let backoff = Backoff::default();
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_ms: backoff.initial.as_millis() as u64,
            backoff_multiplier: backoff.multiplier,
            max_backoff_ms: backoff.max.as_millis() as u64,
            recover_kinds: Vec::new(),
            fatal_kinds: Vec::new(),
        }
    }
}

fn default_max_parallel() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_true() -> bool {
    true
}

fn is_false(b: &bool) -> bool {
    !*b
}
