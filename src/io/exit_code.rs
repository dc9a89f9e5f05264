//! Process exit status of the `cimsuggest` binary.
//!
//! `0` means at least one code was suggested (or the command succeeded),
//! `2` a query that ran but suggested nothing, and every other value names
//! the class of failure so scripts can branch without parsing stderr.

use crate::error::{CorpusError, EvaluationError, SuggestError};
use crate::vector::VectorError;

/// Exit status per outcome class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,

    /// Cancelled queries and anything without a more specific class
    GeneralError = 1,

    /// The query ran but no code was suggested
    NotFound = 2,

    /// Reference document or case file could not be parsed
    ParseError = 3,

    IoError = 4,

    /// Missing index, wrong embedding model, missing API key
    ConfigError = 5,

    /// Persisted index files are unreadable
    IndexCorrupted = 6,

    /// Query text rejected before any stage ran
    InvalidInput = 7,

    /// An external capability failed or answered out of contract
    UpstreamFailure = 8,

    /// A stage deadline expired
    Timeout = 9,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl ExitCode {
    /// Exit code for a finished suggestion, based on whether any code came back.
    pub fn from_suggestion_count(count: usize) -> Self {
        if count == 0 {
            ExitCode::NotFound
        } else {
            ExitCode::Success
        }
    }

    pub fn from_suggest_error(error: &SuggestError) -> Self {
        match error {
            SuggestError::InvalidQuery { .. } => ExitCode::InvalidInput,
            SuggestError::IndexNotBuilt | SuggestError::EmbeddingVersionMismatch { .. } => {
                ExitCode::ConfigError
            }
            SuggestError::Timeout { .. } => ExitCode::Timeout,
            SuggestError::Cancelled { .. } => ExitCode::GeneralError,
            SuggestError::SchemaViolation { .. }
            | SuggestError::UngroundedSuggestion { .. }
            | SuggestError::Failed { .. } => ExitCode::UpstreamFailure,
        }
    }

    pub fn from_corpus_error(error: &CorpusError) -> Self {
        match error {
            CorpusError::MalformedCorpus { .. } => ExitCode::ParseError,
            CorpusError::Io { .. } => ExitCode::IoError,
            CorpusError::Serialization { .. } => ExitCode::IndexCorrupted,
        }
    }

    pub fn from_vector_error(error: &VectorError) -> Self {
        match error {
            VectorError::IndexNotBuilt | VectorError::EmbeddingVersionMismatch { .. } => {
                ExitCode::ConfigError
            }
            VectorError::InvalidFormat(_)
            | VectorError::VersionMismatch { .. }
            | VectorError::Metadata(_) => ExitCode::IndexCorrupted,
            VectorError::Storage(_) => ExitCode::IoError,
            VectorError::Corpus(e) => Self::from_corpus_error(e),
            VectorError::EmbeddingFailed { .. } => ExitCode::UpstreamFailure,
            VectorError::DimensionMismatch { .. } | VectorError::InvalidDimension { .. } => {
                ExitCode::IndexCorrupted
            }
            VectorError::EmptyCorpus => ExitCode::ParseError,
            VectorError::InvalidK(_) => ExitCode::InvalidInput,
            VectorError::InvalidScore { .. } => ExitCode::GeneralError,
        }
    }

    pub fn from_evaluation_error(error: &EvaluationError) -> Self {
        match error {
            EvaluationError::Io { .. } => ExitCode::IoError,
            EvaluationError::Parse { .. } | EvaluationError::EmptyExpectation { .. } => {
                ExitCode::ParseError
            }
            EvaluationError::Serialize(_) => ExitCode::GeneralError,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::NotFound => "No code suggested",
            ExitCode::ParseError => "Parse error",
            ExitCode::IoError => "I/O error",
            ExitCode::ConfigError => "Configuration error",
            ExitCode::IndexCorrupted => "Index corrupted",
            ExitCode::InvalidInput => "Invalid query",
            ExitCode::UpstreamFailure => "Upstream service failure",
            ExitCode::Timeout => "Timed out",
        }
    }
}
