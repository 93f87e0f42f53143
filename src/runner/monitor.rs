//! Run observation.
//!
//! The [`ExecutionMonitor`] is fed by the scheduler and builds the final
//! [`ExecutionReport`]. It never fails and never influences scheduling.
//! Registered [`ExecutionListener`]s get a [`MonitorEvent`] for every change;
//! a panicking listener is logged and otherwise ignored.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::plan::ExecutionPlan;
use super::report::{
    run_status, ErrorDetail, ExecutionReport, RetryRecord, RunStatus, SkipReason, StepReport,
    StepState,
};
use super::step::StepError;

/// How much the monitor records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorLevel {
    /// Final state, attempt count and error only.
    Minimal,
    /// Also timestamps, durations and retry history.
    #[default]
    Detailed,
}

/// A change observed during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    RunStarted {
        steps: usize,
        waves: usize,
    },
    StepStarted {
        step: String,
        attempt: u32,
    },
    StepRetrying {
        step: String,
        attempt: u32,
        error: ErrorDetail,
        backoff: Duration,
    },
    StepFinished {
        step: String,
        state: StepState,
        error: Option<ErrorDetail>,
        skip_reason: Option<SkipReason>,
    },
    RunFinished {
        status: RunStatus,
    },
}

/// Receives monitor events as they happen.
///
/// Called from the scheduler's task; implementations should return quickly.
pub trait ExecutionListener: Send + Sync {
    fn on_event(&self, event: &MonitorEvent);
}

impl<F> ExecutionListener for F
where
    F: Fn(&MonitorEvent) + Send + Sync,
{
    fn on_event(&self, event: &MonitorEvent) {
        self(event)
    }
}

#[derive(Debug)]
struct StepRecord {
    wave: usize,
    optional: bool,
    state: StepState,
    skip_reason: Option<SkipReason>,
    attempts: u32,
    started: Option<Instant>,
    finished: Option<Instant>,
    error: Option<ErrorDetail>,
    retries: Vec<RetryRecord>,
}

impl StepRecord {
    fn new(wave: usize, optional: bool) -> Self {
        Self {
            wave,
            optional,
            state: StepState::Pending,
            skip_reason: None,
            attempts: 0,
            started: None,
            finished: None,
            error: None,
            retries: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct MonitorState {
    anchor: Instant,
    anchor_wall: DateTime<Utc>,
    order: Vec<String>,
    records: HashMap<String, StepRecord>,
    cancelled: bool,
}

impl MonitorState {
    fn new() -> Self {
        Self {
            anchor: Instant::now(),
            anchor_wall: Utc::now(),
            order: Vec::new(),
            records: HashMap::new(),
            cancelled: false,
        }
    }

    fn record(&mut self, id: &str) -> &mut StepRecord {
        if !self.records.contains_key(id) {
            self.order.push(id.to_string());
        }
        self.records
            .entry(id.to_string())
            .or_insert_with(|| StepRecord::new(0, false))
    }

    fn wall(&self, at: Instant) -> DateTime<Utc> {
        let offset = chrono::Duration::from_std(at.saturating_duration_since(self.anchor))
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.anchor_wall + offset
    }
}

/// Collects per-step progress into an [`ExecutionReport`].
pub struct ExecutionMonitor {
    level: MonitorLevel,
    listeners: Vec<Arc<dyn ExecutionListener>>,
    state: Mutex<MonitorState>,
}

impl std::fmt::Debug for ExecutionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionMonitor")
            .field("level", &self.level)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl Default for ExecutionMonitor {
    fn default() -> Self {
        Self::new(MonitorLevel::default())
    }
}

impl ExecutionMonitor {
    pub fn new(level: MonitorLevel) -> Self {
        Self {
            level,
            listeners: Vec::new(),
            state: Mutex::new(MonitorState::new()),
        }
    }

    /// Add a listener.
    pub fn with_listener(mut self, listener: Arc<dyn ExecutionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn level(&self) -> MonitorLevel {
        self.level
    }

    /// Reset the monitor for a new run of `plan`.
    ///
    /// Anchors the clock and pre-registers every planned step as pending so
    /// the report lists steps in plan order.
    pub fn begin(&self, plan: &ExecutionPlan) {
        {
            let mut state = self.state.lock();
            *state = MonitorState::new();
            for id in plan.execution_order() {
                let wave = plan.wave_of(id).unwrap_or(0);
                let optional = plan.step(id).is_some_and(|s| s.is_optional());
                state.order.push(id.to_string());
                state
                    .records
                    .insert(id.to_string(), StepRecord::new(wave, optional));
            }
        }
        self.notify(MonitorEvent::RunStarted {
            steps: plan.len(),
            waves: plan.waves().len(),
        });
    }

    /// A step attempt was dispatched.
    pub fn on_step_start(&self, id: &str, attempt: u32) {
        {
            let mut state = self.state.lock();
            let now = Instant::now();
            let record = state.record(id);
            record.state = StepState::Running;
            record.attempts = record.attempts.max(attempt);
            record.started.get_or_insert(now);
        }
        self.notify(MonitorEvent::StepStarted {
            step: id.to_string(),
            attempt,
        });
    }

    /// Attempt `attempt` of a step failed and will be retried after `backoff`.
    pub fn on_step_retry(&self, id: &str, attempt: u32, error: &StepError, backoff: Duration) {
        let detail = ErrorDetail::from(error);
        {
            let mut state = self.state.lock();
            let record = state.record(id);
            record.error = Some(detail.clone());
            if self.level == MonitorLevel::Detailed {
                record.retries.push(RetryRecord {
                    attempt,
                    error: detail.clone(),
                    backoff,
                });
            }
        }
        self.notify(MonitorEvent::StepRetrying {
            step: id.to_string(),
            attempt,
            error: detail,
            backoff,
        });
    }

    /// A step reached a terminal state after running.
    pub fn on_step_end(&self, id: &str, state: StepState, error: Option<&StepError>) {
        let detail = error.map(ErrorDetail::from);
        {
            let mut guard = self.state.lock();
            let now = Instant::now();
            let record = guard.record(id);
            record.state = state;
            record.finished = Some(now);
            record.error = detail.clone();
        }
        self.notify(MonitorEvent::StepFinished {
            step: id.to_string(),
            state,
            error: detail,
            skip_reason: None,
        });
    }

    /// A step was skipped without running.
    pub fn on_step_skipped(&self, id: &str, reason: SkipReason) {
        {
            let mut state = self.state.lock();
            let record = state.record(id);
            record.state = StepState::Skipped;
            record.skip_reason = Some(reason.clone());
        }
        self.notify(MonitorEvent::StepFinished {
            step: id.to_string(),
            state: StepState::Skipped,
            error: None,
            skip_reason: Some(reason),
        });
    }

    /// Record that the run was cancelled.
    pub fn mark_cancelled(&self) {
        self.state.lock().cancelled = true;
    }

    /// Current state of a step, if known.
    pub fn state_of(&self, id: &str) -> Option<StepState> {
        self.state.lock().records.get(id).map(|r| r.state)
    }

    /// Build the final report.
    pub fn finalize(&self) -> ExecutionReport {
        let report = {
            let state = self.state.lock();
            let detailed = self.level == MonitorLevel::Detailed;

            let steps: Vec<StepReport> = state
                .order
                .iter()
                .filter_map(|id| state.records.get(id).map(|r| (id, r)))
                .map(|(id, r)| {
                    let duration = match (r.started, r.finished) {
                        (Some(start), Some(end)) if detailed => {
                            Some(end.saturating_duration_since(start))
                        }
                        _ => None,
                    };
                    StepReport {
                        id: id.clone(),
                        wave: r.wave,
                        state: r.state,
                        skip_reason: r.skip_reason.clone(),
                        attempts: r.attempts,
                        optional: r.optional,
                        started_at: r.started.filter(|_| detailed).map(|t| state.wall(t)),
                        finished_at: r.finished.filter(|_| detailed).map(|t| state.wall(t)),
                        duration,
                        error: r.error.clone(),
                        retries: r.retries.clone(),
                    }
                })
                .collect();

            let now = Instant::now();
            ExecutionReport {
                status: run_status(&steps, state.cancelled),
                started_at: state.anchor_wall,
                finished_at: state.wall(now),
                duration: now.saturating_duration_since(state.anchor),
                steps,
            }
        };

        self.notify(MonitorEvent::RunFinished {
            status: report.status,
        });
        report
    }

    fn notify(&self, event: MonitorEvent) {
        for listener in &self.listeners {
            let result = catch_unwind(AssertUnwindSafe(|| listener.on_event(&event)));
            if result.is_err() {
                warn!(event = ?event, "Execution listener panicked; ignoring");
            }
        }
    }
}
