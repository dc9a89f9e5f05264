//! Newtypes and errors of the vector index.

use std::cmp::Ordering;
use thiserror::Error;

/// Cosine similarity between a query and a chunk, always within [-1.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score(f32);

impl Score {
    /// Rejects NaN and values outside [-1.0, 1.0].
    pub fn new(value: f32) -> Result<Self, VectorError> {
        let reason = if value.is_nan() {
            "a similarity score cannot be NaN"
        } else if !(-1.0..=1.0).contains(&value) {
            "a similarity score lies within [-1.0, 1.0]"
        } else {
            return Ok(Self(value));
        };
        Err(VectorError::InvalidScore { value, reason })
    }

    /// Accepts a raw cosine value, clamping float drift past the bounds.
    pub fn from_similarity(value: f32) -> Result<Self, VectorError> {
        Self::new(if value.is_nan() { value } else { value.clamp(-1.0, 1.0) })
    }

    #[must_use]
    pub fn get(&self) -> f32 {
        self.0
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        // NaN is rejected at construction
        self.0.total_cmp(&other.0)
    }
}

/// Number of components of every vector in one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorDimension(usize);

impl VectorDimension {
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: dim,
                reason: "an embedding has at least one component",
            });
        }
        Ok(Self(dim))
    }

    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Fails with `DimensionMismatch` unless `vector` has exactly this many components.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        match vector.len() {
            len if len == self.0 => Ok(()),
            actual => Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual,
            }),
        }
    }
}

/// Failures of index construction, search and persistence.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector has {actual} components where the index expects {expected}\nSuggestion: Rebuild the index with the configured embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Unusable vector dimension {dimension}: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error("Unusable similarity {value}: {reason}")]
    InvalidScore { value: f32, reason: &'static str },

    #[error("Invalid result count k = {0}\nSuggestion: Request at least one result")]
    InvalidK(usize),

    #[error("Cannot build an index from an empty chunk set")]
    EmptyCorpus,

    #[error("Vector index has not been built\nSuggestion: Run 'cimsuggest ingest <document>' first")]
    IndexNotBuilt,

    #[error(
        "Embedding model mismatch: index built with '{expected}', got '{actual}'\nSuggestion: Rebuild the index with 'cimsuggest ingest --force'"
    )]
    EmbeddingVersionMismatch { expected: String, actual: String },

    #[error(
        "Embedding generation failed: {reason}\nSuggestion: Verify the embedding model is properly initialized"
    )]
    EmbeddingFailed { reason: String, transient: bool },

    #[error("Index I/O failed: {0}\nSuggestion: Check that the index directory is writable and the disk is not full")]
    Storage(#[from] std::io::Error),

    #[error(
        "Invalid storage format: {0}\nSuggestion: The index may be corrupted, re-run ingestion"
    )]
    InvalidFormat(String),

    #[error(
        "Invalid storage version: expected {expected}, got {actual}\nSuggestion: Re-run ingestion to rebuild the index"
    )]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("Unreadable index metadata: {0}")]
    Metadata(String),

    #[error(transparent)]
    Corpus(#[from] crate::error::CorpusError),
}

impl VectorError {
    /// Whether retrying the failed operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingFailed {
                transient: true,
                ..
            }
        )
    }
}
