//! Built-once, read-many index state shared across concurrent queries.
//!
//! An [`IndexSnapshot`] pairs the chunk store with the vectors built from it.
//! [`SharedIndex`] holds the current snapshot behind a lock that is only taken
//! to clone or swap the `Arc`, so queries never observe a half-built index and
//! a rebuild never blocks in-flight queries.

use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::corpus::{Chunk, ChunkId, ChunkStore};
use crate::vector::{
    IndexMetadata, VECTORS_FILE, VectorError, VectorIndex, read_vectors, write_vectors,
};

/// Chunk store and vector index that were built together.
#[derive(Debug)]
pub struct IndexSnapshot {
    store: ChunkStore,
    vectors: VectorIndex,
}

impl IndexSnapshot {
    /// Pairs a store with its vectors, checking that both cover the same chunks.
    pub fn new(store: ChunkStore, vectors: VectorIndex) -> Result<Self, VectorError> {
        if store.len() != vectors.len() {
            return Err(VectorError::InvalidFormat(format!(
                "Index has {} vectors for {} chunks",
                vectors.len(),
                store.len()
            )));
        }
        if let Some((id, _)) = vectors.entries().iter().find(|(id, _)| store.get(*id).is_none()) {
            return Err(VectorError::InvalidFormat(format!(
                "Vector for unknown chunk {id}"
            )));
        }
        Ok(Self { store, vectors })
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn vectors(&self) -> &VectorIndex {
        &self.vectors
    }

    pub fn chunk(&self, id: ChunkId) -> Option<&Arc<Chunk>> {
        self.store.get(id)
    }

    /// Writes chunks, vectors and metadata into `dir`.
    pub fn save(&self, dir: &Path, source_sha256: String) -> Result<(), VectorError> {
        std::fs::create_dir_all(dir)?;
        self.store.save(dir)?;
        write_vectors(&dir.join(VECTORS_FILE), self.vectors.dimension(), self.vectors.entries())?;

        IndexMetadata::new(
            self.vectors.model_name().to_string(),
            self.vectors.dimension().get(),
            self.store.len(),
            source_sha256,
        )
        .save(dir)?;

        info!(
            "Saved index with {} chunks to {}",
            self.store.len(),
            dir.display()
        );
        Ok(())
    }

    /// Loads a persisted index built with `expected_model`.
    ///
    /// # Errors
    /// [`VectorError::IndexNotBuilt`] when `dir` holds no index,
    /// [`VectorError::EmbeddingVersionMismatch`] when it was built with a
    /// different embedding model.
    pub fn load(dir: &Path, expected_model: &str) -> Result<Self, VectorError> {
        if !IndexMetadata::exists(dir) || !ChunkStore::exists(dir) {
            return Err(VectorError::IndexNotBuilt);
        }

        let metadata = IndexMetadata::load(dir)?;
        if metadata.model_name != expected_model {
            return Err(VectorError::EmbeddingVersionMismatch {
                expected: metadata.model_name,
                actual: expected_model.to_string(),
            });
        }

        let store = ChunkStore::load(dir)?;
        let (dimension, entries) = read_vectors(&dir.join(VECTORS_FILE))?;
        if dimension.get() != metadata.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: metadata.dimension,
                actual: dimension.get(),
            });
        }

        let vectors = VectorIndex::from_entries(metadata.model_name, dimension, entries)?;
        debug!("Loaded index from {}", dir.display());
        Self::new(store, vectors)
    }
}

/// Process-wide handle to the current index snapshot.
#[derive(Debug, Default, Clone)]
pub struct SharedIndex {
    current: Arc<RwLock<Option<Arc<IndexSnapshot>>>>,
}

impl SharedIndex {
    /// Creates a handle with no index installed.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: IndexSnapshot) -> Self {
        let shared = Self::empty();
        shared.install(snapshot);
        shared
    }

    /// Returns the current snapshot, or [`VectorError::IndexNotBuilt`].
    pub fn snapshot(&self) -> Result<Arc<IndexSnapshot>, VectorError> {
        self.current.read().clone().ok_or(VectorError::IndexNotBuilt)
    }

    /// Atomically replaces the current snapshot. Queries already holding the
    /// previous snapshot finish against it.
    pub fn install(&self, snapshot: IndexSnapshot) {
        *self.current.write() = Some(Arc::new(snapshot));
    }

    pub fn is_built(&self) -> bool {
        self.current.read().is_some()
    }
}
