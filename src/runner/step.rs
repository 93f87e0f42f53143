//! The step run contract.
//!
//! A step is an opaque unit of pipeline work. The orchestration core only
//! knows how to invoke it through [`Step::run`] and how to interpret the
//! result; what a step does with the [`SharedContext`] is its own business.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Error kind reported when a step exceeds its timeout.
pub const TIMEOUT_KIND: &str = "timeout";

/// Error kind reported when a step's run contract panics.
pub const PANIC_KIND: &str = "panic";

/// Opaque success payload returned by a step.
pub type StepOutput = Value;

/// Structured failure returned by a step's run contract.
///
/// The optional `kind` is a machine-readable tag that recovery policies
/// dispatch on (for example `"timeout"` or `"catalog_unavailable"`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StepError {
    /// Human-readable description.
    pub message: String,
    /// Machine-readable kind, if any.
    pub kind: Option<String>,
}

impl StepError {
    /// Create an error without a kind.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
        }
    }

    /// Create an error tagged with a kind.
    pub fn with_kind(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: Some(kind.into()),
        }
    }

    /// Error for a run that exceeded `limit`.
    pub fn timeout(limit: Duration) -> Self {
        Self::with_kind(TIMEOUT_KIND, format!("timed out after {:?}", limit))
    }

    /// The kind tag, if any.
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// Whether this error came from a timeout.
    pub fn is_timeout(&self) -> bool {
        self.kind() == Some(TIMEOUT_KIND)
    }
}

/// Key/value store shared by every step of a run.
///
/// Steps use it to hand intermediate artifacts (parsed orders, validation
/// results, ...) to later steps. Cloning is cheap; all clones see the same
/// data.
#[derive(Debug, Clone, Default)]
pub struct SharedContext {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl SharedContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().get(key).cloned()
    }

    /// Store `value` under `key`, returning the previous value.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.inner.write().insert(key.into(), value.into())
    }

    /// Remove and return the value stored under `key`.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.write().remove(key)
    }

    /// Check whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Check whether the context is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Copy of the whole map.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.inner.read().clone()
    }
}

/// Everything a step receives when it is invoked.
#[derive(Debug, Clone)]
pub struct StepContext {
    step_id: String,
    attempt: u32,
    shared: SharedContext,
    cancel: CancellationToken,
}

impl StepContext {
    /// Create a context for one invocation of `step_id`.
    pub fn new(
        step_id: impl Into<String>,
        attempt: u32,
        shared: SharedContext,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            attempt,
            shared,
            cancel,
        }
    }

    /// Id of the step being run.
    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    /// 1-based attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The run-wide shared context.
    pub fn shared(&self) -> &SharedContext {
        &self.shared
    }

    /// Token cancelled when this attempt times out.
    ///
    /// Cancelling the run does not fire it: a running step is allowed to
    /// finish.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Shorthand for `self.cancellation().is_cancelled()`.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A unit of pipeline work.
#[async_trait]
pub trait Step: Send + Sync {
    /// Run the step once.
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, StepError>;
}

/// A [`Step`] backed by an async closure. Built with [`step_fn`].
pub struct FnStep<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Step for FnStep<F>
where
    F: Fn(StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutput, StepError>> + Send,
{
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, StepError> {
        (self.f)(ctx).await
    }
}

/// Wrap an async closure as a [`Step`].
///
/// ```
/// use agentflow::runner::{step_fn, StepDescriptor};
///
/// let reader = StepDescriptor::new(
///     "po_reader",
///     step_fn(|ctx| async move {
///         ctx.shared().insert("customer_orders", serde_json::json!([]));
///         Ok(serde_json::Value::Null)
///     }),
/// );
/// assert_eq!(reader.id(), "po_reader");
/// ```
pub fn step_fn<F, Fut>(f: F) -> FnStep<F>
where
    F: Fn(StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutput, StepError>> + Send,
{
    FnStep { f }
}

/// Immutable description of one registered step.
///
/// Built with a consuming builder:
///
/// ```
/// use agentflow::runner::{step_fn, StepDescriptor};
/// use std::time::Duration;
///
/// let step = StepDescriptor::new("so_creator", step_fn(|_| async { Ok(serde_json::Value::Null) }))
///     .depends_on(["validation"])
///     .with_priority(80)
///     .with_group("post_validation")
///     .with_timeout(Duration::from_secs(30));
/// assert_eq!(step.dependencies(), ["validation"]);
/// ```
#[derive(Clone)]
pub struct StepDescriptor {
    id: String,
    dependencies: Vec<String>,
    priority: i64,
    parallel_group: Option<String>,
    enabled: bool,
    optional: bool,
    critical: bool,
    timeout: Option<Duration>,
    max_attempts: Option<u32>,
    step: Arc<dyn Step>,
}

impl fmt::Debug for StepDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDescriptor")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .field("priority", &self.priority)
            .field("parallel_group", &self.parallel_group)
            .field("enabled", &self.enabled)
            .field("optional", &self.optional)
            .field("critical", &self.critical)
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl StepDescriptor {
    /// Create a descriptor with no dependencies and priority 0.
    pub fn new(id: impl Into<String>, step: impl Step + 'static) -> Self {
        Self::from_arc(id, Arc::new(step))
    }

    /// Create a descriptor around an already shared step implementation.
    pub fn from_arc(id: impl Into<String>, step: Arc<dyn Step>) -> Self {
        Self {
            id: id.into(),
            dependencies: Vec::new(),
            priority: 0,
            parallel_group: None,
            enabled: true,
            optional: false,
            critical: false,
            timeout: None,
            max_attempts: None,
            step,
        }
    }

    /// Add dependencies. Duplicates are ignored; declaration order is kept.
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dep in deps {
            let dep = dep.into();
            if !self.dependencies.contains(&dep) {
                self.dependencies.push(dep);
            }
        }
        self
    }

    /// Set the dispatch priority (higher first).
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Tag the step with a parallel group.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.parallel_group = Some(group.into());
        self
    }

    /// Enable or disable the step.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Mark the step optional: its failure does not fail the run.
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Mark the step critical: its failure aborts the run.
    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Limit how long a single attempt may run.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Cap the total number of attempts for this step.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn parallel_group(&self) -> Option<&str> {
        self.parallel_group.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Shared handle to the run contract.
    pub fn runner(&self) -> Arc<dyn Step> {
        Arc::clone(&self.step)
    }
}
