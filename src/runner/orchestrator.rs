//! Composition of configuration and step implementations.
//!
//! An [`Orchestrator`] is built once per pipeline definition: it binds step
//! implementations to the ids declared in an [`OrchestrationConfig`],
//! validates the graph and keeps the resulting plan. Each call to
//! [`Orchestrator::run`] is an independent run with fresh state.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::OrchestrationConfig;
use crate::error::{OrchestrationError, Result};

use super::dependency::DependencyGraph;
use super::monitor::{ExecutionListener, ExecutionMonitor};
use super::plan::ExecutionPlan;
use super::recovery::RecoveryPolicy;
use super::registry::StepRegistry;
use super::report::ExecutionReport;
use super::scheduler::ExecutionScheduler;
use super::step::{SharedContext, Step, StepDescriptor};

/// A validated, runnable pipeline.
pub struct Orchestrator {
    config: OrchestrationConfig,
    registry: StepRegistry,
    plan: ExecutionPlan,
    scheduler: ExecutionScheduler,
    listeners: Vec<Arc<dyn ExecutionListener>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("steps", &self.registry.len())
            .field("waves", &self.plan.waves().len())
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn config(&self) -> &OrchestrationConfig {
        &self.config
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    /// Run the pipeline once.
    pub async fn run(&self, shared: SharedContext, cancel: CancellationToken) -> ExecutionReport {
        let monitor = self
            .listeners
            .iter()
            .fold(ExecutionMonitor::new(self.config.monitor_level()), |m, l| {
                m.with_listener(Arc::clone(l))
            });

        self.scheduler
            .run(&self.plan, shared, &monitor, cancel)
            .await
    }
}

/// Builder for [`Orchestrator`].
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: OrchestrationConfig,
    steps: Vec<(String, Arc<dyn Step>)>,
    descriptors: Vec<StepDescriptor>,
    listeners: Vec<Arc<dyn ExecutionListener>>,
    policy: Option<Arc<dyn RecoveryPolicy>>,
}

impl std::fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("config", &self.config)
            .field("steps", &self.steps.len())
            .field("descriptors", &self.descriptors)
            .field("listeners", &self.listeners.len())
            .field("policy", &self.policy.is_some())
            .finish()
    }
}

impl OrchestratorBuilder {
    /// Use this pipeline configuration.
    pub fn config(mut self, config: OrchestrationConfig) -> Self {
        self.config = config;
        self
    }

    /// Bind an implementation to a step id.
    ///
    /// Dependencies, priority, group and per-step settings come from the
    /// configuration.
    pub fn step(self, id: impl Into<String>, step: impl Step + 'static) -> Self {
        self.step_arc(id, Arc::new(step))
    }

    /// Like [`step`](Self::step) for an already shared implementation.
    pub fn step_arc(mut self, id: impl Into<String>, step: Arc<dyn Step>) -> Self {
        self.steps.push((id.into(), step));
        self
    }

    /// Register a fully specified descriptor; configuration is not applied.
    pub fn descriptor(mut self, descriptor: StepDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn ExecutionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Override the recovery policy derived from the configuration.
    pub fn policy(mut self, policy: Arc<dyn RecoveryPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Register the steps and build the plan.
    ///
    /// Config-declared steps come first, in config order, followed by
    /// implementations the config does not mention and then raw descriptors.
    ///
    /// # Errors
    ///
    /// - `UnknownStep` if a declared step has no implementation
    /// - `DuplicateStep` if an id is bound twice
    /// - `MissingDependency` / `CyclicDependency` from plan building
    pub fn build(self) -> Result<Orchestrator> {
        let Self {
            config,
            steps,
            descriptors,
            listeners,
            policy,
        } = self;

        let mut seen = HashSet::new();
        for (id, _) in &steps {
            if !seen.insert(id.as_str()) {
                return Err(OrchestrationError::DuplicateStep { id: id.clone() });
            }
        }

        let mut registry = StepRegistry::new();
        for id in config.step_ids() {
            if let Some(descriptor) = descriptors.iter().find(|d| d.id() == id) {
                registry.register(descriptor.clone())?;
                continue;
            }
            let runner = steps
                .iter()
                .find(|(step_id, _)| step_id == id)
                .map(|(_, step)| Arc::clone(step))
                .ok_or_else(|| OrchestrationError::UnknownStep { id: id.to_string() })?;
            registry.register(configured_descriptor(&config, id, runner))?;
        }

        for (id, runner) in &steps {
            if !registry.contains(id) {
                registry.register(configured_descriptor(&config, id, Arc::clone(runner)))?;
            }
        }

        for descriptor in descriptors {
            if config.dependencies.contains_key(descriptor.id()) {
                continue;
            }
            registry.register(descriptor)?;
        }

        let plan = DependencyGraph::build(registry.all())?;
        debug!(
            steps = plan.len(),
            waves = plan.waves().len(),
            "Built execution plan"
        );

        let policy = policy.unwrap_or_else(|| Arc::new(config.recovery_policy()));
        let scheduler = ExecutionScheduler::new(config.scheduler_config()).with_policy(policy);

        Ok(Orchestrator {
            config,
            registry,
            plan,
            scheduler,
            listeners,
        })
    }
}

/// Apply the config's settings for `id` to a new descriptor.
fn configured_descriptor(
    config: &OrchestrationConfig,
    id: &str,
    runner: Arc<dyn Step>,
) -> StepDescriptor {
    let agent = config.agent(id);
    let mut descriptor = StepDescriptor::from_arc(id, runner)
        .depends_on(config.dependencies.get(id).cloned().unwrap_or_default())
        .with_priority(config.priority_of(id))
        .enabled(agent.enabled)
        .optional(agent.optional)
        .critical(agent.critical);

    if let Some(group) = config.group_of(id) {
        descriptor = descriptor.with_group(group);
    }
    if let Some(timeout) = agent.timeout() {
        descriptor = descriptor.with_timeout(timeout);
    }
    if let Some(attempts) = agent.max_attempts() {
        descriptor = descriptor.with_max_attempts(attempts);
    }
    descriptor
}
