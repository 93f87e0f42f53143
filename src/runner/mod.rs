//! Step execution orchestration.
//!
//! Leaf first: [`step`] defines the run contract, [`registry`] stores
//! descriptors, [`dependency`] and [`plan`] turn them into waves,
//! [`scheduler`] executes a plan consulting [`recovery`], and [`monitor`]
//! records what happened into a [`report`]. [`orchestrator`] wires all of it
//! to an [`OrchestrationConfig`](crate::config::OrchestrationConfig).

pub mod dependency;
pub mod monitor;
pub mod orchestrator;
pub mod plan;
pub mod recovery;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod step;

pub use dependency::{DependencyGraph, DependencyGraphBuilder};
pub use monitor::{ExecutionListener, ExecutionMonitor, MonitorEvent, MonitorLevel};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use plan::{ExecutionPlan, ParallelGroup, Wave};
pub use recovery::{
    Backoff, DefaultRecoveryPolicy, PropagatePolicy, RecoveryDecision, RecoveryPolicy,
    DEFAULT_MAX_ATTEMPTS,
};
pub use registry::StepRegistry;
pub use report::{
    ErrorDetail, ExecutionReport, RetryRecord, RunStatus, SkipReason, StateCounts, StepReport,
    StepState,
};
pub use scheduler::{ExecutionMode, ExecutionScheduler, SchedulerConfig, DEFAULT_CONCURRENCY};
pub use step::{
    step_fn, FnStep, SharedContext, Step, StepContext, StepDescriptor, StepError, StepOutput,
    PANIC_KIND, TIMEOUT_KIND,
};
