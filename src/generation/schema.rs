//! JSON schema sent with generation requests, and validation of answers.

use serde_json::{Value, json};

use super::model::SuggestionSet;
use crate::error::GenerationError;

/// Name under which the schema is sent to the reasoning service.
pub const SUGGESTION_SCHEMA_NAME: &str = "suggestion_set";

/// Strict JSON schema mirroring [`SuggestionSet`].
pub fn suggestion_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "codes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "code": { "type": "string" },
                        "label": { "type": "string" },
                        "relevance": { "type": "string" },
                        "confidence": { "type": "string", "enum": ["low", "medium", "high"] },
                        "reference_info": { "type": "string" }
                    },
                    "required": ["code", "label", "relevance", "confidence", "reference_info"],
                    "additionalProperties": false
                }
            },
            "coding_rules": { "type": "array", "items": { "type": "string" } },
            "warnings": { "type": "array", "items": { "type": "string" } },
            "related_codes": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["codes", "coding_rules", "warnings", "related_codes"],
        "additionalProperties": false
    })
}

/// Validates a structured answer against the suggestion contract.
///
/// The payload is never partially accepted: any mismatch rejects it whole.
pub fn parse_suggestion_set(value: Value) -> Result<SuggestionSet, GenerationError> {
    let set: SuggestionSet =
        serde_json::from_value(value).map_err(|e| GenerationError::SchemaViolation {
            reason: e.to_string(),
        })?;

    if let Some(position) = set.codes.iter().position(|c| c.code.trim().is_empty()) {
        return Err(GenerationError::SchemaViolation {
            reason: format!("codes[{position}].code is empty"),
        });
    }

    Ok(set)
}
