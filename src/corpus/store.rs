//! Read-only chunk store shared across queries.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::corpus::chunk::{Chunk, ChunkId};
use crate::error::{CorpusError, CorpusResult};

const CHUNKS_FILE: &str = "chunks.json";

/// Ordered collection of chunks, immutable once built.
///
/// Chunks are handed out as `Arc<Chunk>` so search results can carry them
/// without copying the raw context.
#[derive(Debug, Clone, Default)]
pub struct ChunkStore {
    chunks: Vec<Arc<Chunk>>,
    positions: HashMap<ChunkId, usize>,
}

impl ChunkStore {
    /// Builds a store from ingested chunks.
    ///
    /// # Errors
    /// Fails with [`CorpusError::MalformedCorpus`] on duplicate chunk IDs.
    pub fn from_chunks(chunks: Vec<Chunk>) -> CorpusResult<Self> {
        let mut positions = HashMap::with_capacity(chunks.len());
        for (position, chunk) in chunks.iter().enumerate() {
            if positions.insert(chunk.id, position).is_some() {
                return Err(CorpusError::MalformedCorpus {
                    reason: format!("duplicate chunk id {}", chunk.id),
                });
            }
        }

        Ok(Self {
            chunks: chunks.into_iter().map(Arc::new).collect(),
            positions,
        })
    }

    #[must_use]
    pub fn get(&self, id: ChunkId) -> Option<&Arc<Chunk>> {
        self.positions.get(&id).map(|&position| &self.chunks[position])
    }

    /// Chunks in ingestion order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Chunk>> {
        self.chunks.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Arc<Chunk>] {
        &self.chunks
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Saves the chunk sequence as JSON under `dir`.
    pub fn save(&self, dir: &Path) -> CorpusResult<()> {
        let path = dir.join(CHUNKS_FILE);
        std::fs::create_dir_all(dir).map_err(|source| CorpusError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let chunks: Vec<&Chunk> = self.chunks.iter().map(AsRef::as_ref).collect();
        let json = serde_json::to_string_pretty(&chunks).map_err(|source| {
            CorpusError::Serialization {
                path: path.clone(),
                source,
            }
        })?;

        std::fs::write(&path, json).map_err(|source| CorpusError::Io { path, source })
    }

    /// Loads a chunk sequence previously written by [`ChunkStore::save`].
    pub fn load(dir: &Path) -> CorpusResult<Self> {
        let path = dir.join(CHUNKS_FILE);
        let json = std::fs::read_to_string(&path).map_err(|source| CorpusError::Io {
            path: path.clone(),
            source,
        })?;

        let chunks: Vec<Chunk> = serde_json::from_str(&json)
            .map_err(|source| CorpusError::Serialization { path, source })?;

        if chunks.is_empty() {
            return Err(CorpusError::MalformedCorpus {
                reason: "persisted chunk file is empty".to_string(),
            });
        }

        Self::from_chunks(chunks)
    }

    /// Whether a persisted chunk file exists under `dir`.
    #[must_use]
    pub fn exists(dir: &Path) -> bool {
        dir.join(CHUNKS_FILE).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::ingest;
    use tempfile::TempDir;

    #[test]
    fn test_lookup_by_id() {
        let store = ChunkStore::from_chunks(ingest("R05 Toux R50 Fièvre").unwrap()).unwrap();

        assert_eq!(store.len(), 2);
        let second = store.get(ChunkId::new(2).unwrap()).unwrap();
        assert_eq!(second.code, "R50");
        assert!(store.get(ChunkId::new(3).unwrap()).is_none());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut chunks = ingest("R05 Toux R50 Fièvre").unwrap();
        chunks[1].id = chunks[0].id;
        assert!(ChunkStore::from_chunks(chunks).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store =
            ChunkStore::from_chunks(ingest("R06.0\nDyspnée\nR07.1\nDouleur\n").unwrap()).unwrap();

        store.save(temp_dir.path()).unwrap();
        assert!(ChunkStore::exists(temp_dir.path()));

        let loaded = ChunkStore::load(temp_dir.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.as_slice()[0].as_ref(), store.as_slice()[0].as_ref());
        assert_eq!(loaded.as_slice()[1].label, "Douleur");
    }

    #[test]
    fn test_load_missing() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            ChunkStore::load(temp_dir.path()),
            Err(CorpusError::Io { .. })
        ));
    }
}
