//! Reranking by an external reasoning service.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Reranker, validate_permutation};
use crate::capability::{CompletionRequest, ReasoningClient, guard};
use crate::error::{CapabilityError, RerankError};
use crate::retrieval::{SearchResult, assign_ranks};

const RERANK_SYSTEM_PROMPT: &str = "Tu es un expert en codage CIM-10.";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RankedIndices {
    indices: Vec<i64>,
}

/// Asks the reasoning service to order the first `window` candidates.
///
/// Candidates past the window keep their relative order after the reordered
/// window, so the output always covers the whole input.
pub struct LlmReranker {
    reasoner: Arc<dyn ReasoningClient>,
    window: usize,
    timeout: Duration,
}

impl LlmReranker {
    pub fn new(reasoner: Arc<dyn ReasoningClient>) -> Self {
        Self {
            reasoner,
            window: 20,
            timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn request(&self, query: &str, window: &[SearchResult]) -> CompletionRequest {
        let listing: Vec<String> = window
            .iter()
            .enumerate()
            .map(|(i, r)| format!("[{i}] {} - {}", r.chunk.code, r.chunk.label))
            .collect();

        CompletionRequest::new(
            RERANK_SYSTEM_PROMPT,
            format!(
                "Pour le diagnostic \"{query}\", classe ces codes par pertinence.\n\
                 Retourne les indices de TOUS les codes, du plus pertinent au moins pertinent, \
                 chacun exactement une fois.\n\n{}",
                listing.join("\n")
            ),
        )
        .with_max_tokens(200)
        .with_schema(
            "ranked_indices",
            json!({
                "type": "object",
                "properties": {
                    "indices": { "type": "array", "items": { "type": "integer" } }
                },
                "required": ["indices"],
                "additionalProperties": false
            }),
        )
    }

    async fn ranked_indices(&self, request: &CompletionRequest) -> Result<Vec<i64>, CapabilityError> {
        let value = self.reasoner.complete(request).await?.into_structured()?;
        let parsed: RankedIndices = serde_json::from_value(value)
            .map_err(|e| CapabilityError::Schema(format!("invalid ranking: {e}")))?;
        Ok(parsed.indices)
    }
}

#[async_trait]
impl Reranker for LlmReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[SearchResult],
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, RerankError> {
        if candidates.len() <= 1 {
            return Ok(candidates.to_vec());
        }

        let split = self.window.min(candidates.len());
        let (window, tail) = candidates.split_at(split);

        let request = self.request(query, window);
        let indices = guard(self.timeout, cancel, self.ranked_indices(&request))
            .await
            .map_err(|e| match e {
                CapabilityError::Schema(reason) => RerankError::InvalidRerankOutput { reason },
                other => RerankError::Capability(other),
            })?;
        let order = validate_permutation(&indices, window.len())?;

        let mut reranked: Vec<SearchResult> = order.into_iter().map(|i| window[i].clone()).collect();
        reranked.extend_from_slice(tail);
        assign_ranks(&mut reranked);

        debug!(
            "Reranked {} candidates ({} kept in place)",
            window.len(),
            tail.len()
        );
        Ok(reranked)
    }
}
