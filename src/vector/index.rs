//! Flat cosine-similarity index over chunk embeddings.
//!
//! Every query is scored against every stored vector, so `k` larger than the
//! corpus returns the full corpus ranked. Ties keep chunk insertion order.

use rayon::prelude::*;
use std::sync::Arc;
use tracing::debug;

use crate::corpus::{Chunk, ChunkId};
use crate::vector::{EmbeddingGenerator, Score, VectorDimension, VectorError, cosine_similarity};

/// Embedding vectors for one corpus, all produced by a single model.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    /// (chunk, vector) pairs in insertion order
    entries: Vec<(ChunkId, Vec<f32>)>,

    /// Model that produced every vector in `entries`
    model_name: String,

    dimension: VectorDimension,
}

impl VectorIndex {
    /// Embeds every chunk and builds the index.
    ///
    /// `on_batch` is called with the number of chunks embedded so far, after
    /// each batch.
    pub fn build(
        chunks: &[Arc<Chunk>],
        generator: &dyn EmbeddingGenerator,
        batch_size: usize,
        mut on_batch: impl FnMut(usize),
    ) -> Result<Self, VectorError> {
        if chunks.is_empty() {
            return Err(VectorError::EmptyCorpus);
        }

        let mut entries = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.embedding_text()).collect();
            let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            let embeddings = generator.generate_embeddings(&text_refs)?;

            if embeddings.len() != batch.len() {
                return Err(VectorError::EmbeddingFailed {
                    reason: format!(
                        "Generator returned {} embeddings for {} chunks",
                        embeddings.len(),
                        batch.len()
                    ),
                    transient: false,
                });
            }

            entries.extend(batch.iter().map(|c| c.id).zip(embeddings));
            on_batch(entries.len());
        }

        Self::from_entries(
            generator.model_name().to_string(),
            generator.dimension(),
            entries,
        )
    }

    /// Assembles an index from precomputed vectors, validating every dimension.
    pub fn from_entries(
        model_name: String,
        dimension: VectorDimension,
        entries: Vec<(ChunkId, Vec<f32>)>,
    ) -> Result<Self, VectorError> {
        if entries.is_empty() {
            return Err(VectorError::EmptyCorpus);
        }
        for (_, vector) in &entries {
            dimension.validate_vector(vector)?;
        }

        debug!(
            "Built vector index: {} vectors, dimension {}, model {}",
            entries.len(),
            dimension.get(),
            model_name
        );

        Ok(Self {
            entries,
            model_name,
            dimension,
        })
    }

    /// Embeds `text` with `generator` and returns the `k` nearest chunks.
    ///
    /// # Errors
    /// Fails with [`VectorError::EmbeddingVersionMismatch`] when the generator
    /// runs a different model than the one that built the index.
    pub fn query(
        &self,
        text: &str,
        k: usize,
        generator: &dyn EmbeddingGenerator,
    ) -> Result<Vec<(ChunkId, Score)>, VectorError> {
        self.ensure_compatible(generator.model_name())?;
        if k == 0 {
            return Err(VectorError::InvalidK(k));
        }

        let embedding = generator
            .generate_embeddings(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| VectorError::EmbeddingFailed {
                reason: "Generator returned no embedding for the query".to_string(),
                transient: false,
            })?;

        self.search(&embedding, k)
    }

    /// Returns at most `k` (chunk, score) pairs, highest score first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(ChunkId, Score)>, VectorError> {
        if k == 0 {
            return Err(VectorError::InvalidK(k));
        }
        self.dimension.validate_vector(query)?;

        let mut scored = self
            .entries
            .par_iter()
            .map(|(id, vector)| Score::from_similarity(cosine_similarity(query, vector)).map(|s| (*id, s)))
            .collect::<Result<Vec<_>, _>>()?;

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored.truncate(k);

        Ok(scored)
    }

    /// Checks that query embeddings from `model_name` may be mixed with this index.
    pub fn ensure_compatible(&self, model_name: &str) -> Result<(), VectorError> {
        if model_name != self.model_name {
            return Err(VectorError::EmbeddingVersionMismatch {
                expected: self.model_name.clone(),
                actual: model_name.to_string(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn entries(&self) -> &[(ChunkId, Vec<f32>)] {
        &self.entries
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
