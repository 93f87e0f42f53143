//! Recovery decisions for step failures.
//!
//! When a step's run contract fails, the scheduler asks a [`RecoveryPolicy`]
//! whether to retry it, treat it as recovered, or let the failure propagate
//! to its dependents. Policies only see the step, the error and the attempt
//! count, so they can be tested without a scheduler.

use std::collections::HashSet;
use std::time::Duration;

use super::step::{StepDescriptor, StepError};

/// Default total attempts per step (one run plus two retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Decision returned by a recovery policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryDecision {
    /// Re-run the step after the given delay.
    Retry(Duration),
    /// Mark the step recovered; dependents proceed as if it succeeded.
    Recover,
    /// Mark the step failed; dependents are skipped.
    Propagate,
}

/// Decides what happens after a step fails.
pub trait RecoveryPolicy: Send + Sync {
    /// Called after attempt number `attempt` (1-based) of `step` failed.
    fn on_failure(&self, step: &StepDescriptor, error: &StepError, attempt: u32)
        -> RecoveryDecision;

    /// Attempt limit for `step`; a `Retry` at or past it becomes `Propagate`.
    ///
    /// Defaults to the step's own limit, or [`DEFAULT_MAX_ATTEMPTS`] when it
    /// sets none.
    fn max_attempts(&self, step: &StepDescriptor) -> u32 {
        step.max_attempts().unwrap_or(DEFAULT_MAX_ATTEMPTS)
    }
}

/// Exponential backoff between retries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Growth factor applied per further retry.
    pub multiplier: f64,
    /// Upper bound on any single delay.
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            multiplier: 2.0,
            max: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    /// No delay between retries.
    pub fn none() -> Self {
        Self {
            initial: Duration::ZERO,
            multiplier: 1.0,
            max: Duration::ZERO,
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let secs = self.initial.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        Duration::from_secs_f64(secs.min(self.max.as_secs_f64()))
    }
}

/// Retry-then-propagate policy with kind-based overrides.
///
/// - kinds in `fatal_kinds` propagate immediately
/// - kinds in `recover_kinds` are recovered immediately
/// - anything else is retried with backoff until the attempt limit
#[derive(Debug, Clone)]
pub struct DefaultRecoveryPolicy {
    /// Attempt limit for steps that don't set their own.
    pub max_attempts: u32,
    /// Delay schedule between retries.
    pub backoff: Backoff,
    /// Error kinds converted straight to `Recover`.
    pub recover_kinds: HashSet<String>,
    /// Error kinds that are never retried.
    pub fatal_kinds: HashSet<String>,
}

impl Default for DefaultRecoveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::default(),
            recover_kinds: HashSet::new(),
            fatal_kinds: HashSet::new(),
        }
    }
}

impl DefaultRecoveryPolicy {
    /// Create a policy with the default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default attempt limit.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the backoff schedule.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Recover errors of this kind without retrying.
    pub fn recover_on(mut self, kind: impl Into<String>) -> Self {
        self.recover_kinds.insert(kind.into());
        self
    }

    /// Never retry errors of this kind.
    pub fn fatal_on(mut self, kind: impl Into<String>) -> Self {
        self.fatal_kinds.insert(kind.into());
        self
    }
}

impl RecoveryPolicy for DefaultRecoveryPolicy {
    fn on_failure(
        &self,
        step: &StepDescriptor,
        error: &StepError,
        attempt: u32,
    ) -> RecoveryDecision {
        if let Some(kind) = error.kind() {
            if self.fatal_kinds.contains(kind) {
                return RecoveryDecision::Propagate;
            }
            if self.recover_kinds.contains(kind) {
                return RecoveryDecision::Recover;
            }
        }

        if attempt < self.max_attempts(step) {
            RecoveryDecision::Retry(self.backoff.delay(attempt))
        } else {
            RecoveryDecision::Propagate
        }
    }

    fn max_attempts(&self, step: &StepDescriptor) -> u32 {
        step.max_attempts().unwrap_or(self.max_attempts)
    }
}

/// Policy that never retries or recovers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropagatePolicy;

impl RecoveryPolicy for PropagatePolicy {
    fn on_failure(&self, _: &StepDescriptor, _: &StepError, _: u32) -> RecoveryDecision {
        RecoveryDecision::Propagate
    }

    fn max_attempts(&self, _: &StepDescriptor) -> u32 {
        1
    }
}
