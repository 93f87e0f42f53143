//! Status vocabulary for CLI output.
//!
//! `StatusKind` provides the canonical set of status icons and colors used
//! by the progress listener and the run summary.

use super::theme::Theme;
use crate::runner::{RunStatus, StepState};

/// Canonical status kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    Success,
    Failed,
    Skipped,
    Pending,
    Running,
    /// Failed at least once but ended usable.
    Recovered,
    /// Non-fatal warning.
    Warning,
}

impl StatusKind {
    /// Unicode icon for TTY output.
    pub fn icon(self) -> &'static str {
        match self {
            Self::Success => "✓",
            Self::Failed => "✗",
            Self::Skipped => "○",
            Self::Pending => "◌",
            Self::Running => "◆",
            Self::Recovered => "↻",
            Self::Warning => "⚠",
        }
    }

    /// Bracketed text for non-TTY output.
    pub fn bracketed(self) -> &'static str {
        match self {
            Self::Success => "[ok]",
            Self::Failed => "[FAIL]",
            Self::Skipped => "[skip]",
            Self::Pending => "[pending]",
            Self::Running => "[run]",
            Self::Recovered => "[recovered]",
            Self::Warning => "[warn]",
        }
    }

    /// Styled icon string using the given theme.
    pub fn styled(self, theme: &Theme) -> String {
        let icon = self.icon();
        match self {
            Self::Success => theme.success.apply_to(icon).to_string(),
            Self::Failed => theme.error.apply_to(icon).to_string(),
            Self::Skipped | Self::Pending => theme.dim.apply_to(icon).to_string(),
            Self::Running => theme.info.apply_to(icon).to_string(),
            Self::Recovered | Self::Warning => theme.warning.apply_to(icon).to_string(),
        }
    }

    /// Format a status line: styled icon + message.
    pub fn format(self, theme: &Theme, msg: &str) -> String {
        format!("{} {}", self.styled(theme), msg)
    }

    /// Format a status line for non-TTY: bracketed + message.
    pub fn format_plain(self, msg: &str) -> String {
        format!("{} {}", self.bracketed(), msg)
    }
}

impl From<StepState> for StatusKind {
    fn from(state: StepState) -> Self {
        match state {
            StepState::Pending => Self::Pending,
            StepState::Running => Self::Running,
            StepState::Succeeded => Self::Success,
            StepState::Failed => Self::Failed,
            StepState::Skipped => Self::Skipped,
            StepState::Recovered => Self::Recovered,
        }
    }
}

impl From<RunStatus> for StatusKind {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Completed => Self::Success,
            RunStatus::CompletedWithRecoveries => Self::Recovered,
            RunStatus::Failed => Self::Failed,
            RunStatus::Cancelled => Self::Warning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icons_are_distinct() {
        let kinds = [
            StatusKind::Success,
            StatusKind::Failed,
            StatusKind::Skipped,
            StatusKind::Pending,
            StatusKind::Running,
            StatusKind::Recovered,
            StatusKind::Warning,
        ];
        let icons: std::collections::HashSet<_> = kinds.iter().map(|k| k.icon()).collect();
        assert_eq!(icons.len(), kinds.len());
        for kind in kinds {
            assert!(kind.styled(&Theme::plain()).contains(kind.icon()));
        }
    }

    #[test]
    fn format_plain_uses_brackets() {
        assert_eq!(StatusKind::Failed.format_plain("validation"), "[FAIL] validation");
    }

    #[test]
    fn format_includes_icon_and_message() {
        let line = StatusKind::Recovered.format(&Theme::plain(), "so_creator");
        assert_eq!(line, "↻ so_creator");
    }

    #[test]
    fn from_step_state() {
        assert_eq!(StatusKind::from(StepState::Succeeded), StatusKind::Success);
        assert_eq!(StatusKind::from(StepState::Recovered), StatusKind::Recovered);
        assert_eq!(StatusKind::from(StepState::Skipped), StatusKind::Skipped);
        assert_eq!(StatusKind::from(StepState::Failed), StatusKind::Failed);
    }

    #[test]
    fn from_run_status() {
        assert_eq!(StatusKind::from(RunStatus::Completed), StatusKind::Success);
        assert_eq!(StatusKind::from(RunStatus::Failed), StatusKind::Failed);
        assert_eq!(StatusKind::from(RunStatus::Cancelled), StatusKind::Warning);
    }
}
