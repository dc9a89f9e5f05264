//! Terminal display utilities for CLI output.
//!
//! Provides styled tables, progress bars, and formatted help.

pub mod help;
pub mod progress;
pub mod tables;
pub mod theme;

pub use help::{create_help_text, format_command_description, format_help_section};
pub use progress::{create_progress_bar, create_spinner, with_spinner};
pub use tables::{create_evaluation_table, create_suggestion_table};
pub use theme::{Status, THEME, Theme, colors_disabled};
