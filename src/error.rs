//! Error types for the code suggestion pipeline
//!
//! This module provides structured error types using thiserror. Errors are
//! split by the stage that raises them so the pipeline can decide, per stage,
//! whether a failure degrades gracefully or terminates the query.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::vector::VectorError;

/// Stages of a single suggestion query, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Expansion,
    Retrieval,
    Reranking,
    Generation,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expansion => "expansion",
            Self::Retrieval => "retrieval",
            Self::Reranking => "reranking",
            Self::Generation => "generation",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while turning a reference document into chunks
#[derive(Error, Debug)]
pub enum CorpusError {
    #[error(
        "Malformed corpus: {reason}\nSuggestion: Check that the document is the plain-text export of the reference corpus"
    )]
    MalformedCorpus { reason: String },

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize chunks at '{path}': {source}")]
    Serialization {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Errors reading evaluation cases or writing reports
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(
        "Invalid evaluation file '{path}': {source}\nSuggestion: Expected a JSON array of {{\"query\": ..., \"expected\": [...]}} objects"
    )]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to serialize evaluation report: {0}")]
    Serialize(serde_json::Error),

    #[error("Evaluation case {index} ('{query}') has no expected code")]
    EmptyExpectation { index: usize, query: String },
}

/// Failures of an external capability call (embedding or reasoning service)
#[derive(Error, Debug, Clone)]
pub enum CapabilityError {
    /// Network hiccups, rate limiting, 5xx responses. Eligible for a bounded retry.
    #[error("Transient capability failure: {0}")]
    Transient(String),

    /// Authentication, quota or request errors. Retrying will not help.
    #[error("Capability failure: {0}\nSuggestion: Check the API key, quota and model name")]
    Fatal(String),

    /// The service could not produce output matching the requested schema.
    #[error("Schema-constrained output was not conformant: {0}")]
    Schema(String),

    #[error("Capability call timed out after {}ms", after.as_millis())]
    Timeout { after: Duration },

    #[error("Capability call cancelled")]
    Cancelled,
}

impl CapabilityError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Errors from the retrieval stage
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error(transparent)]
    Vector(#[from] VectorError),

    #[error("Query embedding failed: {0}")]
    Capability(#[from] CapabilityError),

    /// Cancellation observed while the query expansion call was suspended.
    #[error("Query expansion cancelled")]
    ExpansionCancelled,
}

/// Errors from the reranking stage. All of them are recoverable.
#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Invalid rerank output: {reason}")]
    InvalidRerankOutput { reason: String },

    #[error("Rerank call failed: {0}")]
    Capability(#[from] CapabilityError),
}

/// Errors from the generation stage
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generated output violates the suggestion schema: {reason}")]
    SchemaViolation { reason: String },

    #[error("Generated codes are absent from the retrieved evidence: {}", codes.join(", "))]
    UngroundedSuggestion { codes: Vec<String> },

    #[error("Generation call failed: {0}")]
    Capability(#[from] CapabilityError),
}

/// Terminal failure of one `suggest` call.
///
/// This is the only error type that leaves the pipeline; recoverable stage
/// errors never surface here.
#[derive(Error, Debug)]
pub enum SuggestError {
    #[error("Invalid query: {reason}")]
    InvalidQuery { reason: String },

    #[error("Vector index has not been built\nSuggestion: Run 'cimsuggest ingest <document>' first")]
    IndexNotBuilt,

    #[error(
        "Embedding model mismatch: index built with '{expected}', query embedded with '{actual}'\nSuggestion: Rebuild the index with 'cimsuggest ingest --force'"
    )]
    EmbeddingVersionMismatch { expected: String, actual: String },

    #[error("Generated output violates the suggestion schema: {reason}")]
    SchemaViolation { reason: String },

    #[error("Generated codes are absent from the retrieved evidence: {}", codes.join(", "))]
    UngroundedSuggestion { codes: Vec<String> },

    #[error("{stage} stage failed: {reason}")]
    Failed { stage: Stage, reason: String },

    #[error("{stage} stage timed out after {}ms", after.as_millis())]
    Timeout { stage: Stage, after: Duration },

    #[error("Query cancelled during {stage} stage")]
    Cancelled { stage: Stage },
}

impl SuggestError {
    /// Stable identifier for this error, used as `kind` in structured responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidQuery { .. } => "INVALID_QUERY",
            Self::IndexNotBuilt => "INDEX_NOT_BUILT",
            Self::EmbeddingVersionMismatch { .. } => "EMBEDDING_VERSION_MISMATCH",
            Self::SchemaViolation { .. } => "SCHEMA_VIOLATION",
            Self::UngroundedSuggestion { .. } => "UNGROUNDED_SUGGESTION",
            Self::Failed { .. } => "STAGE_FAILED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Cancelled { .. } => "CANCELLED",
        }
    }

    /// The stage that terminated the query, if the failure happened inside one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::InvalidQuery { .. } => None,
            Self::IndexNotBuilt | Self::EmbeddingVersionMismatch { .. } => Some(Stage::Retrieval),
            Self::SchemaViolation { .. } | Self::UngroundedSuggestion { .. } => {
                Some(Stage::Generation)
            }
            Self::Failed { stage, .. } | Self::Timeout { stage, .. } | Self::Cancelled { stage } => {
                Some(*stage)
            }
        }
    }

    /// HTTP-style status for the query surface.
    ///
    /// Malformed input maps to 400, expired deadlines to 504 and every other
    /// fatal stage failure to 502. Cancellation means the server gave up on
    /// the request, which is reported as 503.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidQuery { .. } => 400,
            Self::Timeout { .. } => 504,
            Self::Cancelled { .. } => 503,
            _ => 502,
        }
    }

    /// Structured error object returned to callers in place of a result.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }

    pub(crate) fn from_capability(stage: Stage, error: CapabilityError) -> Self {
        match error {
            CapabilityError::Timeout { after } => Self::Timeout { stage, after },
            CapabilityError::Cancelled => Self::Cancelled { stage },
            CapabilityError::Schema(reason) => Self::SchemaViolation { reason },
            other => Self::Failed {
                stage,
                reason: other.to_string(),
            },
        }
    }
}

impl From<RetrievalError> for SuggestError {
    fn from(error: RetrievalError) -> Self {
        match error {
            RetrievalError::Vector(VectorError::IndexNotBuilt) => Self::IndexNotBuilt,
            RetrievalError::Vector(VectorError::EmbeddingVersionMismatch { expected, actual }) => {
                Self::EmbeddingVersionMismatch { expected, actual }
            }
            RetrievalError::Vector(other) => Self::Failed {
                stage: Stage::Retrieval,
                reason: other.to_string(),
            },
            RetrievalError::Capability(e) => Self::from_capability(Stage::Retrieval, e),
            RetrievalError::ExpansionCancelled => Self::Cancelled {
                stage: Stage::Expansion,
            },
        }
    }
}

impl From<GenerationError> for SuggestError {
    fn from(error: GenerationError) -> Self {
        match error {
            GenerationError::SchemaViolation { reason } => Self::SchemaViolation { reason },
            GenerationError::UngroundedSuggestion { codes } => Self::UngroundedSuggestion { codes },
            GenerationError::Capability(e) => Self::from_capability(Stage::Generation, e),
        }
    }
}

/// `{ kind, message }` error object of the query surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// Result type alias for ingestion
pub type CorpusResult<T> = Result<T, CorpusError>;

/// Result type alias for a whole suggestion query
pub type SuggestResult<T> = Result<T, SuggestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let invalid = SuggestError::InvalidQuery {
            reason: "empty".to_string(),
        };
        assert_eq!(invalid.http_status(), 400);

        let timeout = SuggestError::Timeout {
            stage: Stage::Generation,
            after: Duration::from_secs(30),
        };
        assert_eq!(timeout.http_status(), 504);
        assert_eq!(timeout.stage(), Some(Stage::Generation));

        let schema = SuggestError::SchemaViolation {
            reason: "missing field `codes`".to_string(),
        };
        assert_eq!(schema.http_status(), 502);
        assert_eq!(schema.kind(), "SCHEMA_VIOLATION");
    }

    #[test]
    fn test_capability_errors_keep_their_stage() {
        let err = SuggestError::from(GenerationError::Capability(CapabilityError::Timeout {
            after: Duration::from_millis(250),
        }));
        match err {
            SuggestError::Timeout { stage, after } => {
                assert_eq!(stage, Stage::Generation);
                assert_eq!(after, Duration::from_millis(250));
            }
            other => panic!("Expected timeout, got {other:?}"),
        }

        let err = SuggestError::from(RetrievalError::Capability(CapabilityError::Cancelled));
        assert!(matches!(
            err,
            SuggestError::Cancelled {
                stage: Stage::Retrieval
            }
        ));

        let err = SuggestError::from(RetrievalError::ExpansionCancelled);
        assert_eq!(err.stage(), Some(Stage::Expansion));
    }

    #[test]
    fn test_vector_errors_map_to_configuration_failures() {
        let err = SuggestError::from(RetrievalError::Vector(VectorError::IndexNotBuilt));
        assert_eq!(err.kind(), "INDEX_NOT_BUILT");

        let err = SuggestError::from(RetrievalError::Vector(
            VectorError::EmbeddingVersionMismatch {
                expected: "AllMiniLML6V2".to_string(),
                actual: "BGESmallENV15".to_string(),
            },
        ));
        assert_eq!(err.kind(), "EMBEDDING_VERSION_MISMATCH");
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn test_error_body_serialization() {
        let body = SuggestError::Cancelled {
            stage: Stage::Reranking,
        }
        .to_body();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["kind"], "CANCELLED");
        assert!(json["message"].as_str().unwrap().contains("reranking"));
    }
}
