//! Console output.
//!
//! - [`StatusKind`] icons and [`Theme`] styles
//! - [`ProgressListener`] prints step events as they happen
//! - [`Renderer`] formats plans, reports and validation issues

pub mod icons;
pub mod progress;
pub mod summary;
pub mod theme;

pub use icons::StatusKind;
pub use progress::{format_duration, ProgressListener};
pub use summary::Renderer;
pub use theme::{should_use_colors, Theme};
