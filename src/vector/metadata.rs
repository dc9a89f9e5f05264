//! Metadata recorded alongside a persisted index.
//!
//! Tracks the embedding model and the source document so that a stale or
//! foreign index is detected at load time instead of producing silently
//! wrong rankings.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::vector::VectorError;

/// File name of the metadata inside the index directory.
pub const METADATA_FILE: &str = "metadata.json";

/// Metadata for a persisted index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Name of the embedding model used
    pub model_name: String,

    /// Dimension of embeddings
    pub dimension: usize,

    /// Number of chunks (and vectors) stored
    pub chunk_count: usize,

    /// SHA-256 of the ingested document, hex encoded
    pub source_sha256: String,

    /// Unix timestamp when created
    pub created_at: u64,

    /// Version of the metadata format
    pub version: u32,
}

impl IndexMetadata {
    const CURRENT_VERSION: u32 = 1;

    pub fn new(model_name: String, dimension: usize, chunk_count: usize, source_sha256: String) -> Self {
        Self {
            model_name,
            dimension,
            chunk_count,
            source_sha256,
            created_at: chrono::Utc::now().timestamp().max(0) as u64,
            version: Self::CURRENT_VERSION,
        }
    }

    pub fn save(&self, dir: &Path) -> Result<(), VectorError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| VectorError::Metadata(format!("Failed to serialize metadata: {e}")))?;
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(METADATA_FILE), json)?;
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self, VectorError> {
        let json = std::fs::read_to_string(dir.join(METADATA_FILE))?;
        let metadata: Self = serde_json::from_str(&json)
            .map_err(|e| VectorError::Metadata(format!("Failed to parse metadata: {e}")))?;

        if metadata.version > Self::CURRENT_VERSION {
            return Err(VectorError::VersionMismatch {
                expected: Self::CURRENT_VERSION,
                actual: metadata.version,
            });
        }

        Ok(metadata)
    }

    pub fn exists(dir: &Path) -> bool {
        dir.join(METADATA_FILE).exists()
    }
}

/// Hex-encoded SHA-256 of `content`.
pub fn content_digest(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
