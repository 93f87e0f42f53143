//! Live progress output.

use std::time::Duration;

use console::Term;

use super::icons::StatusKind;
use super::theme::Theme;
use crate::runner::{ExecutionListener, MonitorEvent, StepState};

/// Prints one line per step event to stderr.
#[derive(Debug, Clone)]
pub struct ProgressListener {
    theme: Theme,
    /// Bracketed labels instead of icons.
    plain: bool,
    term: Term,
}

impl ProgressListener {
    pub fn new(colors: bool) -> Self {
        Self {
            theme: Theme::for_output(colors),
            plain: !colors,
            term: Term::stderr(),
        }
    }

    fn status(&self, kind: StatusKind, msg: &str) -> String {
        if self.plain {
            kind.format_plain(msg)
        } else {
            kind.format(&self.theme, msg)
        }
    }

    /// The line printed for `event`, if any.
    pub fn render(&self, event: &MonitorEvent) -> Option<String> {
        match event {
            MonitorEvent::RunStarted { steps, waves } => Some(format!(
                "{} ({} steps, {} waves)",
                self.theme.format_header("Running pipeline"),
                steps,
                waves
            )),
            MonitorEvent::StepStarted { step, attempt } if *attempt == 1 => {
                Some(self.status(StatusKind::Running, step))
            }
            MonitorEvent::StepStarted { .. } => None,
            MonitorEvent::StepRetrying {
                step,
                attempt,
                error,
                backoff,
            } => Some(self.status(
                StatusKind::Warning,
                &format!(
                    "{} attempt {} failed: {} {}",
                    step,
                    attempt,
                    error.message,
                    self.theme
                        .duration
                        .apply_to(format!("(retrying in {})", format_duration(*backoff)))
                ),
            )),
            MonitorEvent::StepFinished {
                step,
                state,
                error,
                skip_reason,
            } => {
                let detail = match (state, error, skip_reason) {
                    (StepState::Skipped, _, Some(reason)) => format!("{} ({})", step, reason),
                    (_, Some(error), _) => format!("{}: {}", step, error.message),
                    _ => step.clone(),
                };
                Some(self.status(StatusKind::from(*state), &detail))
            }
            MonitorEvent::RunFinished { .. } => None,
        }
    }
}

impl ExecutionListener for ProgressListener {
    fn on_event(&self, event: &MonitorEvent) {
        if let Some(line) = self.render(event) {
            // Progress output is best effort.
            let _ = self.term.write_line(&line);
        }
    }
}

/// Format a duration for display.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 1.0 {
        format!("{}ms", d.as_millis())
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let mins = secs / 60.0;
        format!("{:.1}m", mins)
    }
}
