//! Visual theme and styling.

use console::Style;

/// Console styles used by agentflow output.
#[derive(Debug, Clone)]
pub struct Theme {
    /// Succeeded steps and completed runs (green).
    pub success: Style,
    /// Recovered steps and validation warnings (orange).
    pub warning: Style,
    /// Failures (red bold).
    pub error: Style,
    /// Running steps (magenta).
    pub info: Style,
    /// Secondary text.
    pub dim: Style,
    /// Step ids (bold).
    pub highlight: Style,
    /// Headers (magenta bold).
    pub header: Style,
    /// Durations and attempt counters (dim).
    pub duration: Style,
    /// Key labels in key-value displays (bold).
    pub key: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self::new()
    }
}

impl Theme {
    pub fn new() -> Self {
        Self {
            success: Style::new().green(),
            warning: Style::new().color256(208),
            error: Style::new().red().bold(),
            info: Style::new().magenta(),
            dim: Style::new().dim(),
            highlight: Style::new().bold(),
            header: Style::new().bold().magenta(),
            duration: Style::new().dim(),
            key: Style::new().bold(),
        }
    }

    /// Create a theme without colors (for non-TTY or --no-color).
    pub fn plain() -> Self {
        Self {
            success: Style::new(),
            warning: Style::new(),
            error: Style::new(),
            info: Style::new(),
            dim: Style::new(),
            highlight: Style::new(),
            header: Style::new(),
            duration: Style::new(),
            key: Style::new(),
        }
    }

    /// Pick the colored or plain theme.
    pub fn for_output(colors: bool) -> Self {
        if colors {
            Self::new()
        } else {
            Self::plain()
        }
    }

    /// Format a header line.
    pub fn format_header(&self, title: &str) -> String {
        format!("{}", self.header.apply_to(title))
    }

    /// Format a key-value line.
    pub fn format_kv(&self, key: &str, value: impl std::fmt::Display) -> String {
        format!("{} {}", self.key.apply_to(format!("{}:", key)), value)
    }
}

/// Check if colors should be enabled.
pub fn should_use_colors() -> bool {
    // https://no-color.org/
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    console::Term::stderr().is_term()
}
