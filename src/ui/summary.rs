//! Rendering of plans, reports and validation issues.

use std::fmt::Write;

use super::icons::StatusKind;
use super::progress::format_duration;
use super::theme::Theme;
use crate::config::{Severity, ValidationIssue};
use crate::runner::{ExecutionPlan, ExecutionReport};

/// Text renderer shared by the CLI commands.
#[derive(Debug, Clone)]
pub struct Renderer {
    theme: Theme,
    plain: bool,
}

impl Renderer {
    pub fn new(colors: bool) -> Self {
        Self {
            theme: Theme::for_output(colors),
            plain: !colors,
        }
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    fn status(&self, kind: StatusKind, msg: &str) -> String {
        if self.plain {
            kind.format_plain(msg)
        } else {
            kind.format(&self.theme, msg)
        }
    }

    /// Waves with their parallel groups.
    pub fn plan(&self, plan: &ExecutionPlan) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{}",
            self.theme.format_header(&format!(
                "Execution plan: {} steps in {} waves",
                plan.len(),
                plan.waves().len()
            ))
        );

        for wave in plan.waves() {
            let _ = writeln!(out, "  Wave {}", wave.index() + 1);
            for group in wave.groups() {
                let members: Vec<String> = group
                    .steps()
                    .iter()
                    .map(|id| {
                        let priority = plan.step(id).map_or(0, |s| s.priority());
                        format!(
                            "{} {}",
                            self.theme.highlight.apply_to(id),
                            self.theme.dim.apply_to(format!("(priority {})", priority))
                        )
                    })
                    .collect();
                match group.tag() {
                    Some(tag) => {
                        let _ = writeln!(
                            out,
                            "    [{}] {}",
                            self.theme.info.apply_to(tag),
                            members.join(", ")
                        );
                    }
                    None => {
                        let _ = writeln!(out, "    {}", members.join(", "));
                    }
                }
            }
        }
        out
    }

    /// Per-step outcome followed by the overall status.
    pub fn report(&self, report: &ExecutionReport) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.theme.format_header("Summary"));

        for step in &report.steps {
            let mut line = step.id.clone();
            if step.attempts > 1 {
                let _ = write!(line, " ({} attempts)", step.attempts);
            }
            if let Some(duration) = step.duration {
                let _ = write!(
                    line,
                    " {}",
                    self.theme.duration.apply_to(format_duration(duration))
                );
            }
            if let Some(reason) = &step.skip_reason {
                let _ = write!(line, " - {}", reason);
            } else if let Some(error) = &step.error {
                let _ = write!(line, " - {}", error.message);
            }
            let _ = writeln!(out, "  {}", self.status(step.state.into(), &line));
        }

        let counts = report.counts();
        let _ = writeln!(
            out,
            "{}",
            self.status(
                report.status.into(),
                &format!(
                    "Run {} in {} ({} succeeded, {} recovered, {} failed, {} skipped)",
                    report.status,
                    format_duration(report.duration),
                    counts.succeeded,
                    counts.recovered,
                    counts.failed,
                    counts.skipped
                ),
            )
        );
        out
    }

    /// One line per issue.
    pub fn issues(&self, issues: &[ValidationIssue]) -> String {
        let mut out = String::new();
        for issue in issues {
            let kind = match issue.severity {
                Severity::Error => StatusKind::Failed,
                Severity::Warning => StatusKind::Warning,
            };
            let _ = writeln!(
                out,
                "{}",
                self.status(kind, &format!("{} [{}]", issue.message, issue.rule))
            );
        }
        out
    }
}
