//! Wave-by-wave step execution.
//!
//! The scheduler walks an [`ExecutionPlan`] one batch at a time. A batch is
//! a whole wave in coordinated mode, one parallel-group partition of a wave
//! with group isolation, or a single step in sequential mode. Every step of
//! a batch is terminal before the next batch starts.
//!
//! Within a batch, steps are offered to a run-wide semaphore in plan order.
//! Workers report back through a `JoinSet`; only the scheduler task mutates
//! step state.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::monitor::ExecutionMonitor;
use super::plan::ExecutionPlan;
use super::recovery::{DefaultRecoveryPolicy, PropagatePolicy, RecoveryDecision, RecoveryPolicy};
use super::report::{ExecutionReport, SkipReason, StepState};
use super::step::{SharedContext, StepContext, StepDescriptor, StepError, PANIC_KIND};

/// Default number of concurrently running steps.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// How the plan is walked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One step at a time, in plan order.
    Sequential,
    /// Waves dispatched concurrently up to the concurrency limit.
    #[default]
    #[serde(alias = "parallel")]
    Coordinated,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Coordinated => write!(f, "coordinated"),
        }
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Maximum steps running at once; 0 is treated as 1.
    pub concurrency_limit: usize,
    pub mode: ExecutionMode,
    /// When false every failure propagates, whatever the policy says.
    pub error_recovery: bool,
    /// Timeout for steps that don't set their own.
    pub default_timeout: Option<Duration>,
    /// Run each parallel-group partition of a wave as its own batch.
    pub group_isolation: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY,
            mode: ExecutionMode::default(),
            error_recovery: true,
            default_timeout: None,
            group_isolation: false,
        }
    }
}

impl SchedulerConfig {
    /// Effective number of permits.
    pub fn effective_limit(&self) -> usize {
        match self.mode {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Coordinated => self.concurrency_limit.max(1),
        }
    }
}

/// Executes plans.
#[derive(Clone)]
pub struct ExecutionScheduler {
    config: SchedulerConfig,
    policy: Arc<dyn RecoveryPolicy>,
}

impl fmt::Debug for ExecutionScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionScheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for ExecutionScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl ExecutionScheduler {
    /// Create a scheduler using [`DefaultRecoveryPolicy`].
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            policy: Arc::new(DefaultRecoveryPolicy::default()),
        }
    }

    /// Replace the recovery policy.
    pub fn with_policy(mut self, policy: Arc<dyn RecoveryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Execute `plan` to completion.
    ///
    /// Never fails: step failures, skips and cancellation all end up in the
    /// returned report. Cancelling `cancel` stops further dispatch and
    /// abandons pending retries; steps already running are left alone and
    /// waited for.
    pub async fn run(
        &self,
        plan: &ExecutionPlan,
        shared: SharedContext,
        monitor: &ExecutionMonitor,
        cancel: CancellationToken,
    ) -> ExecutionReport {
        let limit = self.config.effective_limit();
        let policy: Arc<dyn RecoveryPolicy> = if self.config.error_recovery {
            Arc::clone(&self.policy)
        } else {
            Arc::new(PropagatePolicy)
        };

        let mut run = Run {
            config: &self.config,
            policy,
            plan,
            monitor,
            shared,
            semaphore: Arc::new(Semaphore::new(limit)),
            halt: cancel.child_token(),
            cancel,
            states: plan
                .execution_order()
                .into_iter()
                .map(|id| (id.to_string(), StepState::Pending))
                .collect(),
            aborted_by: None,
            cancelled: false,
        };

        monitor.begin(plan);
        info!(
            steps = plan.len(),
            waves = plan.waves().len(),
            mode = %self.config.mode,
            concurrency = limit,
            "Starting pipeline run"
        );

        for batch in self.batches(plan) {
            if run.cancel.is_cancelled() {
                info!("Run cancelled; no further steps will be dispatched");
                run.cancelled = true;
                break;
            }
            if run.aborted_by.is_some() {
                break;
            }
            run.run_batch(&batch).await;
        }

        run.skip_remaining();
        if run.cancelled {
            monitor.mark_cancelled();
        }

        let report = monitor.finalize();
        info!(status = %report.status, elapsed = ?report.duration, "Pipeline run finished");
        report
    }

    fn batches(&self, plan: &ExecutionPlan) -> Vec<Vec<String>> {
        if self.config.mode == ExecutionMode::Sequential {
            return plan
                .execution_order()
                .into_iter()
                .map(|id| vec![id.to_string()])
                .collect();
        }

        if self.config.group_isolation {
            return plan
                .waves()
                .iter()
                .flat_map(|w| w.groups().iter().map(|g| g.steps().to_vec()))
                .collect();
        }

        plan.waves().iter().map(|w| w.steps().to_vec()).collect()
    }
}

/// Result of one spawned attempt.
struct Attempt {
    id: String,
    attempt: u32,
    outcome: Outcome,
}

enum Outcome {
    Finished(Result<(), StepError>),
    /// A retry gave up waiting because the run stopped.
    Abandoned,
}

struct InFlight {
    attempt: u32,
    last_error: Option<StepError>,
}

/// Mutable state of one run. Owned by the scheduler task.
struct Run<'a> {
    config: &'a SchedulerConfig,
    policy: Arc<dyn RecoveryPolicy>,
    plan: &'a ExecutionPlan,
    monitor: &'a ExecutionMonitor,
    shared: SharedContext,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    /// Cancelled on external cancellation or a critical failure. Gates
    /// dispatch, retry backoff and pool waits; never reaches a running step.
    halt: CancellationToken,
    states: HashMap<String, StepState>,
    aborted_by: Option<String>,
    cancelled: bool,
}

impl Run<'_> {
    async fn run_batch(&mut self, ids: &[String]) {
        let plan = self.plan;
        let mut pending: VecDeque<String> = VecDeque::with_capacity(ids.len());
        for id in ids {
            let Some(step) = plan.step(id) else {
                continue;
            };
            let blocked = step
                .dependencies()
                .iter()
                .find(|dep| !self.state(dep).satisfies_dependents())
                .cloned();
            if let Some(dependency) = blocked {
                debug!(step = %id, dependency = %dependency, "Skipping step; dependency did not complete");
                self.skip(id, SkipReason::DependencyFailed { dependency });
            } else if !step.is_enabled() {
                debug!(step = %id, "Skipping disabled step");
                self.skip(id, SkipReason::Disabled);
            } else {
                pending.push_back(id.clone());
            }
        }

        if pending.is_empty() {
            return;
        }

        if let Some(wave) = self.plan.wave_of(&pending[0]) {
            debug!(wave, steps = pending.len(), "Dispatching batch");
        }

        let mut tasks: JoinSet<Attempt> = JoinSet::new();
        let mut in_flight: HashMap<String, InFlight> = HashMap::new();
        let halt = self.halt.clone();
        let semaphore = Arc::clone(&self.semaphore);

        loop {
            if pending.is_empty() && tasks.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => match joined {
                    Ok(attempt) => self.complete(attempt, &mut tasks, &mut in_flight),
                    Err(err) => error!(error = %err, "Step task failed to report"),
                },

                _ = halt.cancelled(), if !pending.is_empty() => {
                    let reason = self.stop_reason();
                    for id in pending.drain(..) {
                        self.skip(&id, reason.clone());
                    }
                }

                permit = Arc::clone(&semaphore).acquire_owned(), if !pending.is_empty() => {
                    match permit {
                        Ok(permit) => {
                            if let Some(id) = pending.pop_front() {
                                self.dispatch(&id, 1, Duration::ZERO, Some(permit), &mut tasks);
                                in_flight.insert(id, InFlight { attempt: 1, last_error: None });
                            }
                        }
                        Err(_) => {
                            warn!("Step semaphore closed; stopping dispatch");
                            self.halt.cancel();
                        }
                    }
                }
            }
        }

        // Only reachable if a worker task itself died.
        for (id, flight) in in_flight {
            let err = flight
                .last_error
                .unwrap_or_else(|| StepError::new("step task terminated unexpectedly"));
            self.fail(&id, &err);
        }
    }

    fn complete(
        &mut self,
        attempt: Attempt,
        tasks: &mut JoinSet<Attempt>,
        in_flight: &mut HashMap<String, InFlight>,
    ) {
        let Attempt {
            id,
            attempt,
            outcome,
        } = attempt;
        let Some(flight) = in_flight.remove(&id) else {
            return;
        };
        let plan = self.plan;
        let Some(step) = plan.step(&id) else {
            return;
        };

        match outcome {
            Outcome::Finished(Ok(())) => {
                let state = if attempt > 1 {
                    StepState::Recovered
                } else {
                    StepState::Succeeded
                };
                self.set_state(&id, state);
                self.monitor.on_step_end(&id, state, None);
                info!(step = %id, attempt, state = %state, "Step finished");
            }
            Outcome::Finished(Err(err)) => {
                let decision = self.decide(step, &err, attempt);
                match decision {
                    RecoveryDecision::Retry(backoff) => {
                        warn!(
                            step = %id,
                            attempt,
                            error = %err,
                            backoff = ?backoff,
                            "Step failed; retrying"
                        );
                        self.monitor.on_step_retry(&id, attempt, &err, backoff);
                        self.monitor.on_step_start(&id, attempt + 1);
                        self.dispatch(&id, attempt + 1, backoff, None, tasks);
                        in_flight.insert(
                            id,
                            InFlight {
                                attempt: attempt + 1,
                                last_error: Some(err),
                            },
                        );
                    }
                    RecoveryDecision::Recover => {
                        self.set_state(&id, StepState::Recovered);
                        self.monitor
                            .on_step_end(&id, StepState::Recovered, Some(&err));
                        warn!(step = %id, attempt, error = %err, "Step failed; recovered");
                    }
                    RecoveryDecision::Propagate => self.fail(&id, &err),
                }
            }
            Outcome::Abandoned => {
                if self.aborted_by.is_none() {
                    self.cancelled = true;
                }
                let err = flight
                    .last_error
                    .unwrap_or_else(|| StepError::new("run stopped before retry"));
                debug!(step = %id, attempt = flight.attempt, "Retry abandoned");
                self.fail(&id, &err);
            }
        }
    }

    fn decide(&self, step: &StepDescriptor, err: &StepError, attempt: u32) -> RecoveryDecision {
        let decision = self.policy.on_failure(step, err, attempt);
        match decision {
            RecoveryDecision::Retry(_)
                if attempt >= self.policy.max_attempts(step) || self.halt.is_cancelled() =>
            {
                RecoveryDecision::Propagate
            }
            other => other,
        }
    }

    fn dispatch(
        &self,
        id: &str,
        attempt: u32,
        backoff: Duration,
        permit: Option<OwnedSemaphorePermit>,
        tasks: &mut JoinSet<Attempt>,
    ) {
        let Some(step) = self.plan.step(id) else {
            return;
        };

        if attempt == 1 {
            self.monitor.on_step_start(id, attempt);
        }
        debug!(step = %id, attempt, "Dispatching step");

        let id = id.to_string();
        let runner = step.runner();
        let timeout = step.timeout().or(self.config.default_timeout);
        let shared = self.shared.clone();
        let semaphore = Arc::clone(&self.semaphore);
        let halt = self.halt.clone();

        tasks.spawn(async move {
            let abandoned = |id: String| Attempt {
                id,
                attempt,
                outcome: Outcome::Abandoned,
            };

            let _permit = match permit {
                Some(permit) => permit,
                None => {
                    if !backoff.is_zero() {
                        tokio::select! {
                            _ = tokio::time::sleep(backoff) => {}
                            _ = halt.cancelled() => return abandoned(id),
                        }
                    }
                    tokio::select! {
                        permit = semaphore.acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => return abandoned(id),
                        },
                        _ = halt.cancelled() => return abandoned(id),
                    }
                }
            };

            // Fires only when this attempt times out.
            let token = CancellationToken::new();
            let ctx = StepContext::new(id.clone(), attempt, shared, token.clone());
            let call = AssertUnwindSafe(runner.run(ctx)).catch_unwind();

            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => {
                        token.cancel();
                        Ok(Err(StepError::timeout(limit)))
                    }
                },
                None => call.await,
            };

            let outcome = match result {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(err)) => Err(err),
                Err(payload) => Err(StepError::with_kind(PANIC_KIND, panic_message(payload))),
            };

            Attempt {
                id,
                attempt,
                outcome: Outcome::Finished(outcome),
            }
        });
    }

    fn fail(&mut self, id: &str, err: &StepError) {
        self.set_state(id, StepState::Failed);
        self.monitor.on_step_end(id, StepState::Failed, Some(err));
        warn!(step = %id, error = %err, "Step failed");

        let critical = self.plan.step(id).is_some_and(|s| s.is_critical());
        if critical && self.aborted_by.is_none() {
            error!(step = %id, "Critical step failed; aborting run");
            self.aborted_by = Some(id.to_string());
            self.halt.cancel();
        }
    }

    fn skip(&mut self, id: &str, reason: SkipReason) {
        self.set_state(id, StepState::Skipped);
        self.monitor.on_step_skipped(id, reason);
    }

    /// Skip every step that never got dispatched.
    fn skip_remaining(&mut self) {
        let remaining: Vec<String> = self
            .plan
            .execution_order()
            .into_iter()
            .filter(|id| self.state(id) == StepState::Pending)
            .map(str::to_string)
            .collect();
        if remaining.is_empty() {
            return;
        }

        let reason = self.stop_reason();
        for id in remaining {
            self.skip(&id, reason.clone());
        }
    }

    fn stop_reason(&mut self) -> SkipReason {
        match &self.aborted_by {
            Some(by) => SkipReason::Aborted { by: by.clone() },
            None => {
                self.cancelled = true;
                SkipReason::Cancelled
            }
        }
    }

    fn state(&self, id: &str) -> StepState {
        self.states.get(id).copied().unwrap_or(StepState::Pending)
    }

    fn set_state(&mut self, id: &str, state: StepState) {
        self.states.insert(id.to_string(), state);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("step panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("step panicked: {}", msg)
    } else {
        "step panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::dependency::DependencyGraph;
    use crate::runner::report::RunStatus;
    use crate::runner::step::step_fn;
    use serde_json::Value;

    fn ok(id: &str) -> StepDescriptor {
        StepDescriptor::new(id, step_fn(|_| async { Ok(Value::Null) }))
    }

    fn failing(id: &str) -> StepDescriptor {
        StepDescriptor::new(id, step_fn(|_| async { Err(StepError::new("boom")) }))
    }

    async fn run(steps: &[StepDescriptor], config: SchedulerConfig) -> ExecutionReport {
        let plan = DependencyGraph::build(steps).unwrap();
        ExecutionScheduler::new(config)
            .run(
                &plan,
                SharedContext::new(),
                &ExecutionMonitor::default(),
                CancellationToken::new(),
            )
            .await
    }

    #[test]
    fn sequential_mode_uses_one_permit() {
        let config = SchedulerConfig {
            concurrency_limit: 8,
            mode: ExecutionMode::Sequential,
            ..Default::default()
        };
        assert_eq!(config.effective_limit(), 1);
    }

    #[test]
    fn zero_limit_is_treated_as_one() {
        let config = SchedulerConfig {
            concurrency_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.effective_limit(), 1);
    }

    #[test]
    fn execution_mode_parses_lowercase() {
        let mode: ExecutionMode = serde_json::from_str("\"sequential\"").unwrap();
        assert_eq!(mode, ExecutionMode::Sequential);
        let mode: ExecutionMode = serde_json::from_str("\"parallel\"").unwrap();
        assert_eq!(mode, ExecutionMode::Coordinated);
    }

    #[test]
    fn batches_follow_mode() {
        let steps = vec![
            ok("a"),
            ok("b").with_group("g"),
            ok("c").with_group("g"),
            ok("d").depends_on(["a"]),
        ];
        let plan = DependencyGraph::build(&steps).unwrap();

        let coordinated = ExecutionScheduler::default().batches(&plan);
        assert_eq!(coordinated, vec![vec!["a", "b", "c"], vec!["d"]]);

        let isolated = ExecutionScheduler::new(SchedulerConfig {
            group_isolation: true,
            ..Default::default()
        })
        .batches(&plan);
        assert_eq!(isolated, vec![vec!["a"], vec!["b", "c"], vec!["d"]]);

        let sequential = ExecutionScheduler::new(SchedulerConfig {
            mode: ExecutionMode::Sequential,
            ..Default::default()
        })
        .batches(&plan);
        assert_eq!(sequential.len(), 4);
    }

    #[tokio::test]
    async fn all_steps_succeed() {
        let report = run(
            &[ok("a"), ok("b").depends_on(["a"])],
            SchedulerConfig::default(),
        )
        .await;
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.state_of("b"), Some(StepState::Succeeded));
    }

    #[tokio::test]
    async fn failure_skips_dependents_transitively() {
        let config = SchedulerConfig {
            error_recovery: false,
            ..Default::default()
        };
        let report = run(
            &[
                failing("a"),
                ok("b").depends_on(["a"]),
                ok("c").depends_on(["b"]),
                ok("d"),
            ],
            config,
        )
        .await;

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.state_of("a"), Some(StepState::Failed));
        assert_eq!(report.state_of("b"), Some(StepState::Skipped));
        assert_eq!(
            report.step("c").unwrap().skip_reason,
            Some(SkipReason::DependencyFailed {
                dependency: "b".into()
            })
        );
        assert_eq!(report.state_of("d"), Some(StepState::Succeeded));
        assert_eq!(report.step("b").unwrap().attempts, 0);
    }

    #[tokio::test]
    async fn recovery_disabled_ignores_policy() {
        let config = SchedulerConfig {
            error_recovery: false,
            ..Default::default()
        };
        let report = run(&[failing("a").with_max_attempts(5)], config).await;
        assert_eq!(report.step("a").unwrap().attempts, 1);
        assert_eq!(report.state_of("a"), Some(StepState::Failed));
    }

    #[tokio::test]
    async fn panic_becomes_failure() {
        let panicking = StepDescriptor::new(
            "a",
            step_fn(|_| async {
                if true {
                    panic!("bad row");
                }
                Ok(Value::Null)
            }),
        );
        let config = SchedulerConfig {
            error_recovery: false,
            ..Default::default()
        };
        let report = run(&[panicking], config).await;
        let step = report.step("a").unwrap();
        assert_eq!(step.state, StepState::Failed);
        let error = step.error.as_ref().unwrap();
        assert_eq!(error.kind.as_deref(), Some(PANIC_KIND));
        assert!(error.message.contains("bad row"));
    }

    #[test]
    fn panic_message_formats_payloads() {
        assert_eq!(panic_message(Box::new("x")), "step panicked: x");
        assert_eq!(panic_message(Box::new(String::from("y"))), "step panicked: y");
        assert_eq!(panic_message(Box::new(3u8)), "step panicked");
    }
}
