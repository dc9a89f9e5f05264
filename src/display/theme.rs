//! Terminal styling shared by the CLI commands.

use console::Style;
use owo_colors::OwoColorize;
use std::fmt::Display;
use std::sync::LazyLock;

/// Styling decided once per process from the environment.
pub static THEME: LazyLock<Theme> = LazyLock::new(Theme::detect);

/// Marker printed in front of a one-line status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Done,
    Failed,
    Notice,
}

impl Status {
    fn icon(self) -> &'static str {
        match self {
            Self::Done => "✓",
            Self::Failed => "✗",
            Self::Notice => "⚠",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Theme {
    pub heading: Style,
    pub count: Style,
    /// Files and directories
    pub location: Style,
    pub muted: Style,
    colored: bool,
}

impl Theme {
    /// Colored unless `NO_COLOR` is set or stdout is not a terminal.
    pub fn detect() -> Self {
        Self::new(!colors_disabled())
    }

    pub fn new(colored: bool) -> Self {
        Self {
            heading: Style::new().cyan().bold(),
            count: Style::new().cyan(),
            location: Style::new().magenta(),
            muted: Style::new().dim(),
            colored,
        }
    }

    pub fn is_colored(&self) -> bool {
        self.colored
    }

    pub fn status(&self, status: Status, text: &str) -> String {
        let icon = status.icon();
        if !self.colored {
            return format!("{icon} {text}");
        }
        match status {
            Status::Done => format!("{} {}", icon.green(), text.bright_green()),
            Status::Failed => format!("{} {}", icon.red(), text.bright_red()),
            Status::Notice => format!("{} {}", icon.yellow(), text.bright_yellow()),
        }
    }

    pub fn paint<T: Display>(&self, style: &Style, text: T) -> String {
        if self.colored {
            style.apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }
}

pub fn colors_disabled() -> bool {
    use is_terminal::IsTerminal;
    std::env::var_os("NO_COLOR").is_some() || !std::io::stdout().is_terminal()
}
