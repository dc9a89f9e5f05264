//! The suggestion pipeline.
//!
//! One query moves through `Expansion? -> Retrieval -> Reranking? -> Generation`.
//! Expansion lives inside the retriever it decorates; reranking failures fall
//! back to the retrieval order; retrieval and generation failures end the query.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capability::{ReasoningClient, RetryPolicy};
use crate::config::Settings;
use crate::error::{CapabilityError, RerankError, Stage, SuggestError, SuggestResult};
use crate::generation::{Generator, StructuredGenerator, SuggestionSet};
use crate::rerank::{LlmReranker, Reranker};
use crate::retrieval::{DirectRetriever, ExpandedRetriever, Retriever, SearchResult};
use crate::vector::{EmbeddingGenerator, SharedIndex};

/// Per-query limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Candidates requested from the retriever
    pub top_k: usize,
    /// Candidates handed to the generator after reranking
    pub context_top_k: usize,
    /// Longest accepted query, in characters
    pub max_query_chars: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            top_k: 15,
            context_top_k: 10,
            max_query_chars: 200,
        }
    }
}

impl PipelineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            top_k: settings.retrieval.top_k,
            context_top_k: settings.generation.context_top_k,
            max_query_chars: settings.server.max_query_chars,
        }
    }
}

/// Stateless across queries; share it behind an `Arc` and call it concurrently.
pub struct Pipeline {
    retriever: Arc<dyn Retriever>,
    reranker: Option<Arc<dyn Reranker>>,
    generator: Arc<dyn Generator>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(retriever: Arc<dyn Retriever>, generator: Arc<dyn Generator>) -> Self {
        Self {
            retriever,
            reranker: None,
            generator,
            options: PipelineOptions::default(),
        }
    }

    #[must_use]
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Wires the configured stages around an index handle and two capabilities.
    pub fn from_settings(
        settings: &Settings,
        index: SharedIndex,
        embedder: Arc<dyn EmbeddingGenerator>,
        reasoner: Arc<dyn ReasoningClient>,
    ) -> Self {
        let direct = DirectRetriever::new(index, embedder)
            .with_timeout(settings.embedding.timeout())
            .with_retry(RetryPolicy::new(settings.embedding.max_retries));

        let retriever: Arc<dyn Retriever> = if settings.retrieval.expansion {
            Arc::new(
                ExpandedRetriever::new(direct, Arc::clone(&reasoner))
                    .with_timeout(settings.retrieval.expansion_timeout()),
            )
        } else {
            Arc::new(direct)
        };

        let generator = StructuredGenerator::new(Arc::clone(&reasoner), settings.generation.grounding)
            .with_max_context_chars(settings.generation.max_context_chars)
            .with_timeout(settings.generation.timeout())
            .with_temperature(settings.generation.temperature)
            .with_max_tokens(settings.generation.max_tokens);

        let mut pipeline = Self::new(retriever, Arc::new(generator))
            .with_options(PipelineOptions::from_settings(settings));

        if settings.rerank.enabled {
            pipeline = pipeline.with_reranker(Arc::new(
                LlmReranker::new(reasoner)
                    .with_window(settings.rerank.window)
                    .with_timeout(settings.rerank.timeout()),
            ));
        }

        pipeline
    }

    pub fn options(&self) -> PipelineOptions {
        self.options
    }

    /// Runs one query to completion.
    pub async fn suggest(&self, query: &str) -> SuggestResult<SuggestionSet> {
        self.suggest_with_cancel(query, &CancellationToken::new())
            .await
    }

    /// Runs one query, aborting at the next suspension point once `cancel` fires.
    ///
    /// Either a complete, validated set or a single terminal error comes back;
    /// nothing partial survives a failure.
    pub async fn suggest_with_cancel(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> SuggestResult<SuggestionSet> {
        let query = self.validate_query(query)?;
        let started = Instant::now();

        let candidates = self
            .retriever
            .retrieve(query, self.options.top_k, cancel)
            .await?;
        debug!(
            "{} retrieval returned {} candidates for '{query}'",
            self.retriever.name(),
            candidates.len()
        );

        let mut candidates = self.rerank(query, candidates, cancel).await?;
        candidates.truncate(self.options.context_top_k);

        if cancel.is_cancelled() {
            return Err(SuggestError::Cancelled {
                stage: Stage::Generation,
            });
        }

        let set = self.generator.generate(query, &candidates, cancel).await?;

        info!(
            "Suggested {} codes for '{query}' in {}ms",
            set.codes.len(),
            started.elapsed().as_millis()
        );
        Ok(set)
    }

    /// Dispatches many queries with at most `limit` in flight.
    ///
    /// Results come back in input order, one per query.
    pub async fn suggest_many<S: AsRef<str>>(
        &self,
        queries: &[S],
        limit: usize,
        cancel: &CancellationToken,
    ) -> Vec<SuggestResult<SuggestionSet>> {
        stream::iter(queries.iter().map(|q| self.suggest_with_cancel(q.as_ref(), cancel)))
            .buffered(limit.max(1))
            .collect()
            .await
    }

    fn validate_query<'q>(&self, query: &'q str) -> SuggestResult<&'q str> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(SuggestError::InvalidQuery {
                reason: "query text is empty".to_string(),
            });
        }
        let length = trimmed.chars().count();
        if length > self.options.max_query_chars {
            return Err(SuggestError::InvalidQuery {
                reason: format!(
                    "query has {length} characters, the limit is {}",
                    self.options.max_query_chars
                ),
            });
        }
        Ok(trimmed)
    }

    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<SearchResult>,
        cancel: &CancellationToken,
    ) -> SuggestResult<Vec<SearchResult>> {
        let Some(reranker) = &self.reranker else {
            return Ok(candidates);
        };

        if cancel.is_cancelled() {
            return Err(SuggestError::Cancelled {
                stage: Stage::Reranking,
            });
        }

        match reranker.rerank(query, &candidates, cancel).await {
            Ok(reranked) if reranked.len() == candidates.len() => Ok(reranked),
            Ok(reranked) => {
                warn!(
                    "Reranker returned {} of {} candidates, keeping retrieval order",
                    reranked.len(),
                    candidates.len()
                );
                Ok(candidates)
            }
            Err(RerankError::Capability(CapabilityError::Cancelled)) => Err(SuggestError::Cancelled {
                stage: Stage::Reranking,
            }),
            Err(e) => {
                warn!("Reranking failed, keeping retrieval order: {e}");
                Ok(candidates)
            }
        }
    }
}
