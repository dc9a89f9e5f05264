//! Retrieval strategies.
//!
//! Every strategy implements [`Retriever`]. [`DirectRetriever`] queries the
//! vector index; [`ExpandedRetriever`] wraps any other retriever and enriches
//! the query first, so strategies stack by composition.

mod direct;
mod expanded;

pub use direct::DirectRetriever;
pub use expanded::ExpandedRetriever;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::corpus::{Chunk, ChunkId};
use crate::error::RetrievalError;

/// One retrieved chunk.
///
/// `rank` is 1-based and strictly increasing with position. After reranking,
/// ranks are reassigned while `score` keeps the retrieval similarity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub chunk_id: ChunkId,
    pub score: f32,
    pub rank: usize,
    #[serde(skip)]
    pub chunk: Arc<Chunk>,
}

impl SearchResult {
    pub fn code(&self) -> &str {
        &self.chunk.code
    }
}

/// Renumbers ranks from 1 in current order.
pub fn assign_ranks(results: &mut [SearchResult]) {
    for (position, result) in results.iter_mut().enumerate() {
        result.rank = position + 1;
    }
}

/// A strategy producing ranked candidates for a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Returns at most `k` candidates, best first.
    async fn retrieve(
        &self,
        query: &str,
        k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, RetrievalError>;

    /// Short strategy name, for logs.
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<T: Retriever + ?Sized> Retriever for Arc<T> {
    async fn retrieve(
        &self,
        query: &str,
        k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        (**self).retrieve(query, k, cancel).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

#[async_trait]
impl<T: Retriever + ?Sized> Retriever for Box<T> {
    async fn retrieve(
        &self,
        query: &str,
        k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        (**self).retrieve(query, k, cancel).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
