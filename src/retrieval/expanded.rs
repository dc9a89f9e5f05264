//! Query expansion decorator.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Retriever, SearchResult};
use crate::capability::{CompletionRequest, ReasoningClient, guard};
use crate::error::{CapabilityError, RetrievalError};

const EXPANSION_SYSTEM_PROMPT: &str =
    "Tu es un expert médical. Génère des termes de recherche pertinents.";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExpandedTerms {
    terms: Vec<String>,
}

/// Enriches the query with related medical terms, then delegates to `inner`.
///
/// Expansion failures of any kind fall back to the raw query. Only
/// cancellation aborts the call.
pub struct ExpandedRetriever<R> {
    inner: R,
    reasoner: Arc<dyn ReasoningClient>,
    timeout: Duration,
}

impl<R: Retriever> ExpandedRetriever<R> {
    pub fn new(inner: R, reasoner: Arc<dyn ReasoningClient>) -> Self {
        Self {
            inner,
            reasoner,
            timeout: Duration::from_secs(15),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    async fn expand(&self, query: &str) -> Result<String, CapabilityError> {
        let request = CompletionRequest::new(
            EXPANSION_SYSTEM_PROMPT,
            format!(
                "Pour le diagnostic '{query}', donne des synonymes médicaux français et termes associés."
            ),
        )
        .with_temperature(0.3)
        .with_max_tokens(150)
        .with_schema("expanded_query", expansion_schema());

        let value = self.reasoner.complete(&request).await?.into_structured()?;
        let parsed: ExpandedTerms = serde_json::from_value(value)
            .map_err(|e| CapabilityError::Schema(format!("invalid expansion: {e}")))?;

        Ok(expanded_query(query, &parsed.terms))
    }
}

/// `"{query} {terms}"`, or the bare query when no usable term came back.
fn expanded_query(query: &str, terms: &[String]) -> String {
    let terms: Vec<&str> = terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if terms.is_empty() {
        query.to_string()
    } else {
        format!("{query} {}", terms.join(" "))
    }
}

fn expansion_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "terms": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["terms"],
        "additionalProperties": false
    })
}

#[async_trait]
impl<R: Retriever> Retriever for ExpandedRetriever<R> {
    async fn retrieve(
        &self,
        query: &str,
        k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        let effective = match guard(self.timeout, cancel, self.expand(query)).await {
            Ok(expanded) => {
                debug!("Expanded query: {expanded}");
                expanded
            }
            Err(CapabilityError::Cancelled) => return Err(RetrievalError::ExpansionCancelled),
            Err(e) => {
                warn!("Query expansion failed, falling back to raw query: {e}");
                query.to_string()
            }
        };

        self.inner.retrieve(&effective, k, cancel).await
    }

    fn name(&self) -> &'static str {
        "expanded"
    }
}
