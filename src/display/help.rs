//! Custom help formatting for consistent CLI display.

use crate::display::theme::THEME;
use console::style;

/// Format a help section with a styled title.
pub fn format_help_section(title: &str, content: &str, indent: bool) -> String {
    let mut output = String::new();

    if !THEME.is_colored() {
        output.push_str(&format!("{title}\n"));
    } else {
        output.push_str(&format!("{}\n", style(title).cyan().bold()));
    }

    for line in content.lines() {
        if line.trim().is_empty() {
            output.push('\n');
        } else if indent && !line.starts_with("    ") {
            output.push_str(&format!("  {line}\n"));
        } else {
            output.push_str(&format!("{line}\n"));
        }
    }

    output
}

/// Format a command name and its description on one line.
pub fn format_command_description(name: &str, description: &str) -> String {
    if !THEME.is_colored() {
        format!("  {name:12} {description}")
    } else {
        format!("  {:12} {}", style(name).green(), description)
    }
}

/// Top-level help shown by `cimsuggest --help`.
pub fn create_help_text() -> String {
    let mut help = String::new();

    let quick_start = r#"$ cimsuggest init                         # Write .cimsuggest/settings.toml
$ cimsuggest ingest CIM-10.txt            # Chunk, embed and persist the corpus
$ cimsuggest suggest "dyspnée à l'effort" # Suggest codes for one query"#;
    help.push_str(&format_help_section("Quick Start:", quick_start, true));
    help.push('\n');

    help.push_str("Suggest ICD-10 (CIM-10) codes from a reference corpus.\n\n");

    if !THEME.is_colored() {
        help.push_str("Usage:");
    } else {
        help.push_str(&format!("{}", style("Usage:").cyan().bold()));
    }
    help.push_str(" cimsuggest [OPTIONS] <COMMAND>\n\n");

    let commands = [
        ("init", "Set up .cimsuggest directory with default configuration"),
        ("ingest", "Build the chunk store and vector index from a document"),
        ("suggest", "Suggest codes for a diagnosis or symptom"),
        ("evaluate", "Measure hit@3, hit@5 and recall on labelled cases"),
        ("serve", "Start the HTTP query surface"),
        ("config", "Display active settings"),
        ("help", "Print this message or the help of the given subcommand(s)"),
    ];
    let listing: Vec<String> = commands
        .iter()
        .map(|(name, description)| format_command_description(name, description))
        .collect();
    help.push_str(&format_help_section("Commands:", &listing.join("\n"), false));
    help.push('\n');

    let options = r#"-c, --config <CONFIG>  Path to custom settings.toml file
    --debug            Enable debug logging
-h, --help             Print help
-V, --version          Print version"#;
    help.push_str(&format_help_section("Options:", options, true));

    help
}
