//! Structured synthesis of code suggestions from retrieved candidates.
//!
//! The reasoning service is asked for a [`SuggestionSet`] under a strict JSON
//! schema. Its answer is validated again here before anything reaches the
//! caller, and every suggested code is checked against the candidates under an
//! explicit [`GroundingPolicy`].

mod model;
mod schema;
mod structured;

pub use model::{CodeSuggestion, Confidence, SuggestionSet};
pub use schema::{SUGGESTION_SCHEMA_NAME, parse_suggestion_set, suggestion_schema};
pub use structured::{Generator, GroundingPolicy, StructuredGenerator, build_context};
