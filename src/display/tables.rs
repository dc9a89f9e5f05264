//! Table formatting for suggestions and evaluation results.

use comfy_table::{
    Attribute, Cell, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_FULL,
};

use crate::evaluation::EvaluationReport;
use crate::generation::{Confidence, SuggestionSet};

fn base_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn bold_cells(headers: &[&str]) -> Vec<Cell> {
    headers
        .iter()
        .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
        .collect()
}

fn confidence_color(confidence: Confidence) -> Color {
    match confidence {
        Confidence::High => Color::Green,
        Confidence::Medium => Color::Yellow,
        Confidence::Low => Color::DarkGrey,
    }
}

/// One row per suggested code, in the order the generator ranked them.
pub fn create_suggestion_table(set: &SuggestionSet) -> String {
    let mut table = base_table();
    table.set_header(bold_cells(&["#", "Code", "Label", "Confidence", "Relevance"]));

    for (i, suggestion) in set.codes.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&suggestion.code).add_attribute(Attribute::Bold),
            Cell::new(&suggestion.label),
            Cell::new(suggestion.confidence).fg(confidence_color(suggestion.confidence)),
            Cell::new(&suggestion.relevance),
        ]);
    }

    table.to_string()
}

/// Aggregate metrics followed by one row per case.
pub fn create_evaluation_table(report: &EvaluationReport) -> String {
    let mut details = base_table();
    details.set_header(bold_cells(&["Query", "Expected", "Top 3", "Hit@3", "Recall", "Latency"]));

    for case in &report.details {
        let top3: Vec<&str> = case.suggested.iter().take(3).map(String::as_str).collect();
        let (mark, color) = match (&case.error, case.hit_at_3) {
            (Some(_), _) => ("error", Color::Red),
            (None, true) => ("✓", Color::Green),
            (None, false) => ("✗", Color::Yellow),
        };
        details.add_row(vec![
            Cell::new(&case.query),
            Cell::new(case.expected.join(", ")),
            Cell::new(top3.join(", ")),
            Cell::new(mark).fg(color),
            Cell::new(format!("{:.0}%", case.recall * 100.0)),
            Cell::new(format!("{:.0}ms", case.latency_ms)),
        ]);
    }

    let metrics = report.metrics;
    let mut summary = base_table();
    summary.set_header(bold_cells(&["Metric", "Value"]));
    summary.add_row(vec!["hit@3".to_string(), format!("{:.1}%", metrics.hit_at_3 * 100.0)]);
    summary.add_row(vec!["hit@5".to_string(), format!("{:.1}%", metrics.hit_at_5 * 100.0)]);
    summary.add_row(vec![
        "mean recall".to_string(),
        format!("{:.1}%", metrics.mean_recall * 100.0),
    ]);
    summary.add_row(vec![
        "mean latency".to_string(),
        format!("{:.0}ms", metrics.mean_latency_ms),
    ]);
    summary.add_row(vec![
        Cell::new("cases").add_attribute(Attribute::Bold),
        Cell::new(metrics.case_count).add_attribute(Attribute::Bold),
    ]);

    format!("{details}\n{summary}")
}
