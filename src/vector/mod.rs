//! Embedding-based vector index over reference chunks.
//!
//! # Architecture
//! Every chunk is embedded once at ingestion time. Queries are embedded with
//! the same model and ranked by exhaustive cosine similarity, which keeps the
//! ranking exact and the tie-breaking deterministic. The chunk store and its
//! vectors travel together as an [`IndexSnapshot`] that is swapped atomically
//! through [`SharedIndex`].

mod embedding;
mod handle;
mod index;
mod metadata;
mod similarity;
mod storage;
mod types;

#[cfg(test)]
pub use embedding::MockEmbeddingGenerator;
pub use embedding::{EmbeddingGenerator, FastEmbedGenerator, models_dir, parse_embedding_model};
pub use handle::{IndexSnapshot, SharedIndex};
pub use index::VectorIndex;
pub use metadata::{IndexMetadata, METADATA_FILE, content_digest};
pub use similarity::{cosine_similarity, normalize};
pub use storage::{VECTORS_FILE, read_vectors, write_vectors};
pub use types::{Score, VectorDimension, VectorError};
