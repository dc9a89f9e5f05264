//! Structured output contract of the generation stage.

use serde::{Deserialize, Serialize};

/// Confidence the reasoning service attaches to one suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single suggested code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodeSuggestion {
    pub code: String,
    pub label: String,
    /// Why this code fits the query
    pub relevance: String,
    pub confidence: Confidence,
    /// Excerpt or note taken from the reference corpus
    pub reference_info: String,
}

/// Complete answer to one query.
///
/// Every field is required on input; a payload missing any of them, or
/// carrying extra ones, is a schema violation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuggestionSet {
    /// Suggestions, most relevant first
    pub codes: Vec<CodeSuggestion>,
    pub coding_rules: Vec<String>,
    pub warnings: Vec<String>,
    pub related_codes: Vec<String>,
}

impl SuggestionSet {
    /// Suggested codes in order.
    pub fn suggested_codes(&self) -> Vec<&str> {
        self.codes.iter().map(|c| c.code.as_str()).collect()
    }
}
