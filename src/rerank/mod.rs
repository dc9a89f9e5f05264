//! Relevance reordering of retrieved candidates.
//!
//! A reranker only ever permutes its input. Any answer from the reasoning
//! service that is not a permutation is rejected with
//! [`RerankError::InvalidRerankOutput`] so the caller can keep the prior order.

mod llm;

pub use llm::LlmReranker;

use async_trait::async_trait;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

use crate::error::RerankError;
use crate::retrieval::SearchResult;

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Returns `candidates` reordered, with ranks renumbered from 1.
    async fn rerank(
        &self,
        query: &str,
        candidates: &[SearchResult],
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, RerankError>;
}

#[async_trait]
impl<T: Reranker + ?Sized> Reranker for std::sync::Arc<T> {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[SearchResult],
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, RerankError> {
        (**self).rerank(query, candidates, cancel).await
    }
}

/// Checks that `indices` is a permutation of `0..len`.
///
/// # Errors
/// [`RerankError::InvalidRerankOutput`] on an out-of-range index, a duplicate,
/// or a missing index.
pub fn validate_permutation(indices: &[i64], len: usize) -> Result<Vec<usize>, RerankError> {
    let mut seen = HashSet::with_capacity(len);
    let mut order = Vec::with_capacity(len);

    for &raw in indices {
        let index = usize::try_from(raw)
            .ok()
            .filter(|&i| i < len)
            .ok_or_else(|| RerankError::InvalidRerankOutput {
                reason: format!("index {raw} outside [0, {len})"),
            })?;
        if !seen.insert(index) {
            return Err(RerankError::InvalidRerankOutput {
                reason: format!("index {index} appears more than once"),
            });
        }
        order.push(index);
    }

    if order.len() != len {
        let missing: Vec<String> = (0..len)
            .filter(|i| !seen.contains(i))
            .map(|i| i.to_string())
            .collect();
        return Err(RerankError::InvalidRerankOutput {
            reason: format!("missing indices {}", missing.join(", ")),
        });
    }

    Ok(order)
}
