//! End-to-end scheduling behavior through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agentflow::config::OrchestrationConfig;
use agentflow::runner::{
    step_fn, Backoff, DefaultRecoveryPolicy, DependencyGraph, ExecutionListener, ExecutionMode,
    ExecutionMonitor, ExecutionReport, ExecutionScheduler, MonitorEvent, MonitorLevel,
    Orchestrator, RecoveryDecision, RecoveryPolicy, RunStatus, SchedulerConfig, SharedContext,
    SkipReason, StepDescriptor, StepError, StepState, TIMEOUT_KIND,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

fn ok(id: &str) -> StepDescriptor {
    StepDescriptor::new(id, step_fn(|_| async { Ok(Value::Null) }))
}

fn failing(id: &str, message: &'static str) -> StepDescriptor {
    StepDescriptor::new(id, step_fn(move |_| async move { Err(StepError::new(message)) }))
}

/// A step that appends its id to `log` when it runs.
fn logged(id: &str, log: &Arc<Mutex<Vec<String>>>) -> StepDescriptor {
    let log = Arc::clone(log);
    StepDescriptor::new(
        id,
        step_fn(move |ctx| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(ctx.step_id().to_string());
                Ok(Value::Null)
            }
        }),
    )
}

/// A step that finishes after `delay` unless its own token fires first.
fn cooperative(id: &str, delay: Duration) -> StepDescriptor {
    StepDescriptor::new(
        id,
        step_fn(move |ctx| async move {
            tokio::select! {
                _ = ctx.cancellation().cancelled() => {
                    Err(StepError::with_kind("interrupted", "step token fired"))
                }
                _ = tokio::time::sleep(delay) => Ok(Value::Null),
            }
        }),
    )
}

/// A step that cancels `trigger` after a short delay and succeeds.
fn cancels(id: &str, trigger: &CancellationToken) -> StepDescriptor {
    let trigger = trigger.clone();
    StepDescriptor::new(
        id,
        step_fn(move |_| {
            let trigger = trigger.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                trigger.cancel();
                Ok(Value::Null)
            }
        }),
    )
}

/// A step that fails after a short delay.
fn fails_later(id: &str) -> StepDescriptor {
    StepDescriptor::new(
        id,
        step_fn(|_| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err(StepError::new("mailbox unreachable"))
        }),
    )
}

/// A step that fails on its first call only.
fn flaky(id: &str, calls: &Arc<AtomicUsize>) -> StepDescriptor {
    let counter = Arc::clone(calls);
    StepDescriptor::new(
        id,
        step_fn(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(StepError::new("catalog offline"))
                } else {
                    Ok(Value::Null)
                }
            }
        }),
    )
}

fn no_retries() -> SchedulerConfig {
    SchedulerConfig {
        error_recovery: false,
        ..SchedulerConfig::default()
    }
}

async fn run_with(
    steps: Vec<StepDescriptor>,
    config: SchedulerConfig,
    cancel: CancellationToken,
) -> ExecutionReport {
    let plan = DependencyGraph::build(&steps).unwrap();
    let scheduler = ExecutionScheduler::new(config)
        .with_policy(Arc::new(DefaultRecoveryPolicy::new().with_backoff(Backoff::none())));
    scheduler
        .run(
            &plan,
            SharedContext::new(),
            &ExecutionMonitor::default(),
            cancel,
        )
        .await
}

async fn run(steps: Vec<StepDescriptor>, config: SchedulerConfig) -> ExecutionReport {
    run_with(steps, config, CancellationToken::new()).await
}

#[tokio::test]
async fn exception_failure_skips_summary_only() {
    let mut config = OrchestrationConfig::po_to_so();
    config.enable_error_recovery = false;

    let orchestrator = Orchestrator::builder()
        .config(config)
        .step("po_reader", step_fn(|_| async { Ok(json!({"orders": 2})) }))
        .step("validation", step_fn(|_| async { Ok(Value::Null) }))
        .step(
            "exception_response",
            step_fn(|_| async { Err(StepError::new("mailbox unreachable")) }),
        )
        .step("so_creator", step_fn(|_| async { Ok(Value::Null) }))
        .step("summary_insights", step_fn(|_| async { Ok(Value::Null) }))
        .build()
        .unwrap();

    let waves: Vec<Vec<String>> = orchestrator
        .plan()
        .waves()
        .iter()
        .map(|w| w.steps().to_vec())
        .collect();
    assert_eq!(
        waves,
        vec![
            vec!["po_reader".to_string()],
            vec!["validation".to_string()],
            vec!["exception_response".to_string(), "so_creator".to_string()],
            vec!["summary_insights".to_string()],
        ]
    );

    let report = orchestrator
        .run(SharedContext::new(), CancellationToken::new())
        .await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.state_of("po_reader"), Some(StepState::Succeeded));
    assert_eq!(report.state_of("validation"), Some(StepState::Succeeded));
    assert_eq!(report.state_of("so_creator"), Some(StepState::Succeeded));
    assert_eq!(
        report.state_of("exception_response"),
        Some(StepState::Failed)
    );

    let summary = report.step("summary_insights").unwrap();
    assert_eq!(summary.state, StepState::Skipped);
    assert_eq!(
        summary.skip_reason,
        Some(SkipReason::DependencyFailed {
            dependency: "exception_response".into()
        })
    );
    assert_eq!(
        report.step("exception_response").unwrap().error.as_ref().unwrap().message,
        "mailbox unreachable"
    );
}

#[tokio::test]
async fn cancel_lets_running_wave_finish() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    let steps = vec![
        ok("po_reader"),
        StepDescriptor::new(
            "validation",
            step_fn(move |_| {
                let trigger = trigger.clone();
                async move {
                    trigger.cancel();
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(Value::Null)
                }
            }),
        )
        .depends_on(["po_reader"]),
        ok("so_creator").depends_on(["po_reader"]),
        ok("summary_insights").depends_on(["validation"]),
    ];

    let report = run_with(steps, SchedulerConfig::default(), cancel).await;

    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(report.state_of("po_reader"), Some(StepState::Succeeded));
    assert_eq!(report.state_of("validation"), Some(StepState::Succeeded));
    assert_eq!(report.state_of("so_creator"), Some(StepState::Succeeded));

    let summary = report.step("summary_insights").unwrap();
    assert_eq!(summary.state, StepState::Skipped);
    assert_eq!(summary.skip_reason, Some(SkipReason::Cancelled));
}

#[tokio::test]
async fn cancelled_before_start_runs_nothing() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = run_with(
        vec![ok("a"), ok("b").depends_on(["a"])],
        SchedulerConfig::default(),
        cancel,
    )
    .await;

    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(report.counts().skipped, 2);
}

#[tokio::test]
async fn limit_of_one_follows_priority_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let steps = vec![
        logged("low", &log).with_priority(1),
        logged("high", &log).with_priority(50),
        logged("mid", &log).with_priority(10),
    ];

    let report = run(
        steps,
        SchedulerConfig {
            concurrency_limit: 1,
            ..SchedulerConfig::default()
        },
    )
    .await;

    assert!(report.is_success());
    assert_eq!(*log.lock(), vec!["high", "mid", "low"]);
}

#[tokio::test]
async fn sequential_mode_follows_execution_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let steps = vec![
        logged("b", &log).depends_on(["a"]),
        logged("a", &log),
        logged("c", &log).with_priority(5),
    ];

    let report = run(
        steps,
        SchedulerConfig {
            mode: ExecutionMode::Sequential,
            concurrency_limit: 4,
            ..SchedulerConfig::default()
        },
    )
    .await;

    assert!(report.is_success());
    assert_eq!(*log.lock(), vec!["c", "a", "b"]);
}

#[tokio::test]
async fn concurrency_never_exceeds_limit() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let steps: Vec<StepDescriptor> = (0..6)
        .map(|i| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            StepDescriptor::new(
                format!("agent_{}", i),
                step_fn(move |_| {
                    let running = Arc::clone(&running);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(15)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(Value::Null)
                    }
                }),
            )
        })
        .collect();

    let report = run(steps, SchedulerConfig::default()).await;

    assert!(report.is_success());
    assert_eq!(peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn retry_then_success_is_recovered() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let flaky = StepDescriptor::new(
        "so_creator",
        step_fn(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(StepError::with_kind("catalog_unavailable", "catalog offline"))
                } else {
                    Ok(Value::Null)
                }
            }
        }),
    );

    let report = run(vec![flaky], SchedulerConfig::default()).await;

    assert_eq!(report.status, RunStatus::CompletedWithRecoveries);
    let step = report.step("so_creator").unwrap();
    assert_eq!(step.state, StepState::Recovered);
    assert_eq!(step.attempts, 2);
    assert_eq!(step.retries.len(), 1);
    assert_eq!(step.retries[0].error.message, "catalog offline");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn retries_stop_at_max_attempts() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let broken = StepDescriptor::new(
        "validation",
        step_fn(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(StepError::new("bad header"))
            }
        }),
    )
    .with_max_attempts(2);

    let report = run(vec![broken], SchedulerConfig::default()).await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.step("validation").unwrap().attempts, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn timeout_fails_through_recovery() {
    let slow = StepDescriptor::new(
        "po_reader",
        step_fn(|_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        }),
    )
    .with_timeout(Duration::from_millis(50))
    .with_max_attempts(2);

    let report = run(vec![slow], SchedulerConfig::default()).await;

    let step = report.step("po_reader").unwrap();
    assert_eq!(step.state, StepState::Failed);
    assert_eq!(step.attempts, 2);
    assert_eq!(
        step.error.as_ref().unwrap().kind.as_deref(),
        Some(TIMEOUT_KIND)
    );
}

#[tokio::test(start_paused = true)]
async fn default_timeout_applies_without_step_timeout() {
    let slow = StepDescriptor::new(
        "summary_insights",
        step_fn(|_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        }),
    );

    let report = run(
        vec![slow],
        SchedulerConfig {
            error_recovery: false,
            default_timeout: Some(Duration::from_secs(1)),
            ..SchedulerConfig::default()
        },
    )
    .await;

    assert_eq!(report.state_of("summary_insights"), Some(StepState::Failed));
}

#[tokio::test]
async fn critical_failure_aborts_later_waves() {
    let steps = vec![
        failing("po_reader", "inbox missing").critical(true),
        ok("catalog_sync"),
        ok("report").depends_on(["catalog_sync"]),
    ];

    let report = run(steps, no_retries()).await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.state_of("po_reader"), Some(StepState::Failed));
    assert_eq!(report.state_of("catalog_sync"), Some(StepState::Succeeded));
    assert_eq!(
        report.step("report").unwrap().skip_reason,
        Some(SkipReason::Aborted {
            by: "po_reader".into()
        })
    );
}

#[tokio::test]
async fn optional_failure_does_not_fail_run() {
    let steps = vec![
        ok("so_creator"),
        failing("summary_insights", "llm timeout")
            .depends_on(["so_creator"])
            .optional(true),
    ];

    let report = run(steps, no_retries()).await;

    assert!(report.is_success());
    assert_eq!(report.status, RunStatus::CompletedWithRecoveries);
    assert_eq!(report.state_of("summary_insights"), Some(StepState::Failed));
}

#[tokio::test]
async fn disabled_step_skips_dependents() {
    let steps = vec![
        ok("po_reader"),
        ok("exception_response").depends_on(["po_reader"]).enabled(false),
        ok("summary_insights").depends_on(["exception_response"]),
    ];

    let report = run(steps, SchedulerConfig::default()).await;

    assert_eq!(
        report.step("exception_response").unwrap().skip_reason,
        Some(SkipReason::Disabled)
    );
    assert_eq!(
        report.step("summary_insights").unwrap().skip_reason,
        Some(SkipReason::DependencyFailed {
            dependency: "exception_response".into()
        })
    );
    assert_eq!(report.state_of("po_reader"), Some(StepState::Succeeded));
}

#[tokio::test]
async fn panicking_step_is_contained() {
    let steps = vec![
        StepDescriptor::new(
            "validation",
            step_fn(|_| async { panic!("catalog index out of range") }),
        ),
        ok("so_creator"),
    ];

    let report = run(steps, no_retries()).await;

    let step = report.step("validation").unwrap();
    assert_eq!(step.state, StepState::Failed);
    assert!(step
        .error
        .as_ref()
        .unwrap()
        .message
        .contains("catalog index out of range"));
    assert_eq!(report.state_of("so_creator"), Some(StepState::Succeeded));
}

struct PanickingListener;

impl ExecutionListener for PanickingListener {
    fn on_event(&self, _: &MonitorEvent) {
        panic!("listener bug");
    }
}

#[tokio::test]
async fn panicking_listener_does_not_affect_run() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&events);

    let orchestrator = Orchestrator::builder()
        .descriptor(ok("po_reader"))
        .descriptor(ok("validation").depends_on(["po_reader"]))
        .listener(Arc::new(PanickingListener))
        .listener(Arc::new(move |event: &MonitorEvent| {
            seen.lock().push(event.clone())
        }))
        .build()
        .unwrap();

    let report = orchestrator
        .run(SharedContext::new(), CancellationToken::new())
        .await;

    assert_eq!(report.status, RunStatus::Completed);
    let events = events.lock();
    assert!(matches!(events.first(), Some(MonitorEvent::RunStarted { steps: 2, .. })));
    assert!(matches!(
        events.last(),
        Some(MonitorEvent::RunFinished {
            status: RunStatus::Completed
        })
    ));
}

#[tokio::test]
async fn steps_share_context() {
    let steps = vec![
        StepDescriptor::new(
            "po_reader",
            step_fn(|ctx| async move {
                ctx.shared().insert("po_count", json!(4));
                Ok(Value::Null)
            }),
        ),
        StepDescriptor::new(
            "validation",
            step_fn(|ctx| async move {
                match ctx.shared().get("po_count") {
                    Some(count) if count == json!(4) => Ok(Value::Null),
                    other => Err(StepError::new(format!("unexpected count: {:?}", other))),
                }
            }),
        )
        .depends_on(["po_reader"]),
    ];

    let report = run(steps, no_retries()).await;
    assert_eq!(report.status, RunStatus::Completed);
}

#[tokio::test]
async fn minimal_monitoring_omits_timing() {
    let plan = DependencyGraph::build(&[ok("po_reader")]).unwrap();
    let report = ExecutionScheduler::new(SchedulerConfig::default())
        .run(
            &plan,
            SharedContext::new(),
            &ExecutionMonitor::new(MonitorLevel::Minimal),
            CancellationToken::new(),
        )
        .await;

    let step = report.step("po_reader").unwrap();
    assert_eq!(step.state, StepState::Succeeded);
    assert!(step.started_at.is_none());
    assert!(step.duration.is_none());
}

#[tokio::test]
async fn each_run_starts_fresh() {
    let orchestrator = Orchestrator::builder()
        .descriptor(ok("po_reader"))
        .build()
        .unwrap();

    let first = orchestrator
        .run(SharedContext::new(), CancellationToken::new())
        .await;
    let second = orchestrator
        .run(SharedContext::new(), CancellationToken::new())
        .await;

    assert_eq!(first.status, RunStatus::Completed);
    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(second.step("po_reader").unwrap().attempts, 1);
}

#[tokio::test]
async fn cancel_does_not_interrupt_running_siblings() {
    let cancel = CancellationToken::new();
    let steps = vec![
        ok("po_reader"),
        cancels("exception_response", &cancel).depends_on(["po_reader"]),
        cooperative("so_creator", Duration::from_millis(150)).depends_on(["po_reader"]),
        ok("summary_insights").depends_on(["exception_response", "so_creator"]),
    ];

    let report = run_with(steps, SchedulerConfig::default(), cancel).await;

    assert_eq!(report.status, RunStatus::Cancelled);
    let so = report.step("so_creator").unwrap();
    assert_eq!(so.state, StepState::Succeeded);
    assert!(so.error.is_none());
    assert_eq!(
        report.step("summary_insights").unwrap().skip_reason,
        Some(SkipReason::Cancelled)
    );
}

#[tokio::test]
async fn critical_failure_does_not_interrupt_running_siblings() {
    let steps = vec![
        ok("po_reader"),
        fails_later("exception_response")
            .depends_on(["po_reader"])
            .critical(true),
        cooperative("so_creator", Duration::from_millis(150)).depends_on(["po_reader"]),
        ok("summary_insights").depends_on(["so_creator"]),
    ];

    let report = run(steps, no_retries()).await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.state_of("exception_response"), Some(StepState::Failed));
    assert_eq!(report.state_of("so_creator"), Some(StepState::Succeeded));
    assert_eq!(
        report.step("summary_insights").unwrap().skip_reason,
        Some(SkipReason::Aborted {
            by: "exception_response".into()
        })
    );
}

#[cfg(unix)]
#[tokio::test]
async fn cancel_lets_running_command_finish() {
    use agentflow::shell::CommandStep;

    let cancel = CancellationToken::new();
    let steps = vec![
        ok("po_reader"),
        cancels("exception_response", &cancel).depends_on(["po_reader"]),
        StepDescriptor::new("so_creator", CommandStep::new("sleep 0.3; echo done"))
            .depends_on(["po_reader"]),
    ];

    let report = run_with(steps, SchedulerConfig::default(), cancel).await;

    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(report.state_of("so_creator"), Some(StepState::Succeeded));
}

#[cfg(unix)]
#[tokio::test]
async fn critical_failure_lets_running_command_finish() {
    use agentflow::shell::CommandStep;

    let steps = vec![
        fails_later("exception_response").critical(true),
        StepDescriptor::new("so_creator", CommandStep::new("sleep 0.3; echo done")),
    ];

    let report = run(steps, no_retries()).await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.state_of("so_creator"), Some(StepState::Succeeded));
}

/// Retries until the third attempt without naming an attempt limit.
struct RetryUntilThird;

impl RecoveryPolicy for RetryUntilThird {
    fn on_failure(&self, _: &StepDescriptor, _: &StepError, attempt: u32) -> RecoveryDecision {
        if attempt < 3 {
            RecoveryDecision::Retry(Duration::ZERO)
        } else {
            RecoveryDecision::Propagate
        }
    }
}

#[tokio::test]
async fn custom_policy_retry_is_honoured() {
    let calls = Arc::new(AtomicUsize::new(0));
    let plan = DependencyGraph::build(&[flaky("so_creator", &calls)]).unwrap();

    let report = ExecutionScheduler::new(SchedulerConfig::default())
        .with_policy(Arc::new(RetryUntilThird))
        .run(
            &plan,
            SharedContext::new(),
            &ExecutionMonitor::default(),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(report.state_of("so_creator"), Some(StepState::Recovered));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn retried_step_lets_dependents_run() {
    let calls = Arc::new(AtomicUsize::new(0));
    let steps = vec![
        flaky("validation", &calls),
        ok("so_creator").depends_on(["validation"]),
        ok("summary_insights").depends_on(["so_creator"]),
    ];

    let report = run(steps, SchedulerConfig::default()).await;

    assert_eq!(report.status, RunStatus::CompletedWithRecoveries);
    assert_eq!(report.state_of("validation"), Some(StepState::Recovered));
    assert_eq!(report.state_of("so_creator"), Some(StepState::Succeeded));
    assert_eq!(report.state_of("summary_insights"), Some(StepState::Succeeded));
}

#[tokio::test]
async fn recovered_kind_lets_dependents_run() {
    let steps = vec![
        StepDescriptor::new(
            "exception_response",
            step_fn(|_| async {
                Err(StepError::with_kind("mailbox_unreachable", "smtp down"))
            }),
        ),
        ok("summary_insights").depends_on(["exception_response"]),
    ];
    let plan = DependencyGraph::build(&steps).unwrap();

    let report = ExecutionScheduler::new(SchedulerConfig::default())
        .with_policy(Arc::new(
            DefaultRecoveryPolicy::new().recover_on("mailbox_unreachable"),
        ))
        .run(
            &plan,
            SharedContext::new(),
            &ExecutionMonitor::default(),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(report.status, RunStatus::CompletedWithRecoveries);
    let exception = report.step("exception_response").unwrap();
    assert_eq!(exception.state, StepState::Recovered);
    assert_eq!(exception.attempts, 1);
    assert_eq!(report.state_of("summary_insights"), Some(StepState::Succeeded));
}
