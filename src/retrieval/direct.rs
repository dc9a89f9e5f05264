//! Retrieval straight from the vector index.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Retriever, SearchResult};
use crate::capability::{RetryPolicy, guard, retry_transient};
use crate::error::{CapabilityError, RetrievalError};
use crate::vector::{EmbeddingGenerator, SharedIndex, VectorError};

/// Embeds the query and ranks chunks of the current index snapshot.
pub struct DirectRetriever {
    index: SharedIndex,
    embedder: Arc<dyn EmbeddingGenerator>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl DirectRetriever {
    pub fn new(index: SharedIndex, embedder: Arc<dyn EmbeddingGenerator>) -> Self {
        Self {
            index,
            embedder,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, CapabilityError> {
        let attempt = || {
            let embedder = Arc::clone(&self.embedder);
            let text = query.to_string();
            async move {
                let embedded =
                    tokio::task::spawn_blocking(move || embedder.generate_embeddings(&[&text]))
                        .await
                        .map_err(|e| CapabilityError::Fatal(format!("embedding task failed: {e}")))?;

                match embedded {
                    Ok(vectors) => vectors.into_iter().next().ok_or_else(|| {
                        CapabilityError::Fatal("no embedding returned for query".to_string())
                    }),
                    Err(e) if e.is_transient() => Err(CapabilityError::Transient(e.to_string())),
                    Err(e) => Err(CapabilityError::Fatal(e.to_string())),
                }
            }
        };

        retry_transient(self.retry, "query embedding", attempt).await
    }
}

#[async_trait]
impl Retriever for DirectRetriever {
    async fn retrieve(
        &self,
        query: &str,
        k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        // Pin one snapshot for the whole call
        let snapshot = self.index.snapshot()?;
        snapshot
            .vectors()
            .ensure_compatible(self.embedder.model_name())?;
        if k == 0 {
            return Err(VectorError::InvalidK(k).into());
        }

        let embedding = guard(self.timeout, cancel, self.embed_query(query)).await?;
        // The scan is CPU-bound and fans out over rayon
        let scanned = Arc::clone(&snapshot);
        let ranked = tokio::task::spawn_blocking(move || scanned.vectors().search(&embedding, k))
            .await
            .map_err(|e| CapabilityError::Fatal(format!("vector search task failed: {e}")))??;

        let results = ranked
            .into_iter()
            .enumerate()
            .map(|(position, (chunk_id, score))| {
                let chunk = snapshot.chunk(chunk_id).cloned().ok_or_else(|| {
                    VectorError::InvalidFormat(format!("Index references unknown chunk {chunk_id}"))
                })?;
                Ok(SearchResult {
                    chunk_id,
                    score: score.get(),
                    rank: position + 1,
                    chunk,
                })
            })
            .collect::<Result<Vec<_>, VectorError>>()?;

        debug!("Direct retrieval returned {} candidates", results.len());
        Ok(results)
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}
