//! Progress bars for ingestion and evaluation runs.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const BAR_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

fn started(bar: ProgressBar, style: ProgressStyle, message: &str, tick_ms: u64) -> ProgressBar {
    bar.set_style(style);
    bar.set_message(message.to_owned());
    bar.enable_steady_tick(Duration::from_millis(tick_ms));
    bar
}

/// Bar counting embedded chunks or evaluated cases.
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let style = ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    started(ProgressBar::new(total), style, message, 100)
}

/// Spinner for work of unknown length (model download, a single query).
pub fn create_spinner(message: &str) -> ProgressBar {
    let style = ProgressStyle::with_template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(SPINNER_FRAMES);
    started(ProgressBar::new_spinner(), style, message, 80)
}

/// Runs `operation` behind a spinner that is cleared once it returns.
pub fn with_spinner<T>(message: &str, operation: impl FnOnce() -> T) -> T {
    let spinner = create_spinner(message);
    let outcome = operation();
    spinner.finish_and_clear();
    outcome
}
