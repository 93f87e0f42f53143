//! Execution reports and step states.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use super::step::StepError;
use crate::error::OrchestrationError;

/// Lifecycle state of a step within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Not dispatched yet.
    Pending,
    /// Dispatched and not finished (including waiting between retries).
    Running,
    /// Run contract returned normally on the first attempt.
    Succeeded,
    /// Failed and not recovered.
    Failed,
    /// Never run.
    Skipped,
    /// Failed at least once but ended usable.
    Recovered,
}

impl StepState {
    /// Check if this is a terminal state (no more changes expected).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Skipped | Self::Recovered
        )
    }

    /// Whether dependents may run after this state.
    pub fn satisfies_dependents(self) -> bool {
        matches!(self, Self::Succeeded | Self::Recovered)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Recovered => "recovered",
        }
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a step was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// A dependency ended failed or skipped.
    DependencyFailed { dependency: String },
    /// The step is disabled in configuration.
    Disabled,
    /// The run was cancelled before the step was dispatched.
    Cancelled,
    /// A critical step failed and the run stopped.
    Aborted { by: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DependencyFailed { dependency } => {
                write!(f, "dependency '{}' did not complete", dependency)
            }
            Self::Disabled => write!(f, "disabled"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Aborted { by } => write!(f, "run aborted after '{}' failed", by),
        }
    }
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every step succeeded.
    Completed,
    /// Nothing failed terminally, but something had to be recovered.
    CompletedWithRecoveries,
    /// A non-optional step failed.
    Failed,
    /// The run was cancelled before it could finish.
    Cancelled,
}

impl RunStatus {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Completed | Self::CompletedWithRecoveries)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::CompletedWithRecoveries => "completed with recoveries",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Serializable copy of a [`StepError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl From<&StepError> for ErrorDetail {
    fn from(err: &StepError) -> Self {
        Self {
            message: err.message.clone(),
            kind: err.kind.clone(),
        }
    }
}

/// One failed attempt that was retried.
#[derive(Debug, Clone, Serialize)]
pub struct RetryRecord {
    /// The attempt that failed.
    pub attempt: u32,
    pub error: ErrorDetail,
    #[serde(rename = "backoff_ms", serialize_with = "as_millis")]
    pub backoff: Duration,
}

/// Final record of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub id: String,
    pub wave: usize,
    pub state: StepState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "duration_ms",
        serialize_with = "opt_as_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub retries: Vec<RetryRecord>,
}

/// Number of steps per terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub succeeded: usize,
    pub recovered: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Immutable result of a pipeline run.
///
/// Steps are listed in plan order (wave, then priority).
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
    pub steps: Vec<StepReport>,
}

impl ExecutionReport {
    /// Look up a step's record.
    pub fn step(&self, id: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// State of a step, if it was part of the run.
    pub fn state_of(&self, id: &str) -> Option<StepState> {
        self.step(id).map(|s| s.state)
    }

    /// Steps that ended in `state`.
    pub fn steps_in(&self, state: StepState) -> Vec<&StepReport> {
        self.steps.iter().filter(|s| s.state == state).collect()
    }

    pub fn counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for step in &self.steps {
            match step.state {
                StepState::Succeeded => counts.succeeded += 1,
                StepState::Recovered => counts.recovered += 1,
                StepState::Failed => counts.failed += 1,
                StepState::Skipped => counts.skipped += 1,
                StepState::Pending | StepState::Running => {}
            }
        }
        counts
    }

    /// Whether the run completed (with or without recoveries).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The first non-optional failure as an error, for callers that need one.
    pub fn failure(&self) -> Option<OrchestrationError> {
        self.steps
            .iter()
            .find(|s| s.state == StepState::Failed && !s.optional)
            .map(|s| OrchestrationError::StepExecution {
                step: s.id.clone(),
                message: s
                    .error
                    .as_ref()
                    .map_or_else(|| "failed".to_string(), |e| e.message.clone()),
            })
    }

    /// Pretty-printed JSON rendering.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Derive the overall status from final step records.
pub(crate) fn run_status(steps: &[StepReport], cancelled: bool) -> RunStatus {
    if cancelled {
        return RunStatus::Cancelled;
    }

    let mut recovered = false;
    for step in steps {
        match step.state {
            StepState::Failed if !step.optional => return RunStatus::Failed,
            StepState::Failed | StepState::Recovered => recovered = true,
            _ => {}
        }
    }

    if recovered {
        RunStatus::CompletedWithRecoveries
    } else {
        RunStatus::Completed
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

fn opt_as_millis<S: Serializer>(
    duration: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match duration {
        Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, state: StepState) -> StepReport {
        StepReport {
            id: id.to_string(),
            wave: 0,
            state,
            skip_reason: None,
            attempts: 1,
            optional: false,
            started_at: None,
            finished_at: None,
            duration: None,
            error: None,
            retries: Vec::new(),
        }
    }

    #[test]
    fn terminal_states() {
        assert!(!StepState::Pending.is_terminal());
        assert!(!StepState::Running.is_terminal());
        assert!(StepState::Succeeded.is_terminal());
        assert!(StepState::Failed.is_terminal());
        assert!(StepState::Skipped.is_terminal());
        assert!(StepState::Recovered.is_terminal());
    }

    #[test]
    fn only_success_states_satisfy_dependents() {
        assert!(StepState::Succeeded.satisfies_dependents());
        assert!(StepState::Recovered.satisfies_dependents());
        assert!(!StepState::Failed.satisfies_dependents());
        assert!(!StepState::Skipped.satisfies_dependents());
    }

    #[test]
    fn status_completed_when_all_succeed() {
        let steps = vec![record("a", StepState::Succeeded), record("b", StepState::Succeeded)];
        assert_eq!(run_status(&steps, false), RunStatus::Completed);
    }

    #[test]
    fn status_with_recoveries() {
        let steps = vec![record("a", StepState::Recovered), record("b", StepState::Succeeded)];
        assert_eq!(run_status(&steps, false), RunStatus::CompletedWithRecoveries);
    }

    #[test]
    fn status_failed_on_required_failure() {
        let steps = vec![
            record("a", StepState::Recovered),
            record("b", StepState::Failed),
            record("c", StepState::Skipped),
        ];
        assert_eq!(run_status(&steps, false), RunStatus::Failed);
    }

    #[test]
    fn optional_failure_does_not_fail_run() {
        let mut failed = record("b", StepState::Failed);
        failed.optional = true;
        let steps = vec![record("a", StepState::Succeeded), failed];
        assert_eq!(run_status(&steps, false), RunStatus::CompletedWithRecoveries);
    }

    #[test]
    fn cancellation_wins() {
        let steps = vec![record("a", StepState::Failed)];
        assert_eq!(run_status(&steps, true), RunStatus::Cancelled);
    }

    #[test]
    fn skip_reason_serializes_with_tag() {
        let reason = SkipReason::DependencyFailed {
            dependency: "validation".into(),
        };
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["reason"], "dependency_failed");
        assert_eq!(json["dependency"], "validation");
        assert!(reason.to_string().contains("validation"));
    }

    #[test]
    fn report_counts_and_lookup() {
        let now = Utc::now();
        let report = ExecutionReport {
            status: RunStatus::Failed,
            started_at: now,
            finished_at: now,
            duration: Duration::from_millis(1500),
            steps: vec![
                record("po_reader", StepState::Succeeded),
                record("validation", StepState::Failed),
                record("so_creator", StepState::Skipped),
            ],
        };

        let counts = report.counts();
        assert_eq!(counts.succeeded, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.skipped, 1);
        assert_eq!(report.state_of("validation"), Some(StepState::Failed));
        assert_eq!(report.steps_in(StepState::Skipped)[0].id, "so_creator");
        assert!(!report.is_success());

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["duration_ms"], 1500);
        assert_eq!(json["steps"][1]["state"], "failed");

        let err = report.failure().unwrap();
        assert_eq!(err.to_string(), "Step 'validation' failed: failed");
    }

    #[test]
    fn optional_failure_is_not_reported_as_error() {
        let mut step = record("summary_insights", StepState::Failed);
        step.optional = true;
        let report = ExecutionReport {
            status: RunStatus::CompletedWithRecoveries,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            duration: Duration::ZERO,
            steps: vec![step],
        };
        assert!(report.failure().is_none());
    }
}
