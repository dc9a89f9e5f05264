//! Schema-constrained synthesis of the suggestion set.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::model::SuggestionSet;
use super::schema::{SUGGESTION_SCHEMA_NAME, parse_suggestion_set, suggestion_schema};
use crate::capability::{CompletionRequest, ReasoningClient, guard};
use crate::error::{CapabilityError, GenerationError};
use crate::retrieval::SearchResult;

const SYSTEM_PROMPT: &str = "Tu es un assistant expert en codage médical CIM-10 français (PMSI).
Tu utilises le document de référence fourni comme source principale.

Ton rôle est de suggérer les codes CIM-10 les plus pertinents pour un diagnostic,
symptôme ou maladie donné.

Règles:
1. Propose UNIQUEMENT des codes trouvés dans le contexte fourni
2. Privilégie les codes les plus spécifiques (4 caractères > 3 caractères)
3. Respecte les exclusions et restrictions mentionnées dans le contexte
4. Signale les codes interdits en DP/DR/DA si applicable
5. Mentionne les doubles codages dague (†) / astérisque (*) quand pertinent";

/// What to do with a generated code that no candidate carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroundingPolicy {
    /// Drop the code, keep the rest and record a warning.
    #[default]
    Warn,
    /// Fail the query with `UngroundedSuggestion`.
    Reject,
}

/// A strategy turning candidates into a suggestion set.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        query: &str,
        candidates: &[SearchResult],
        cancel: &CancellationToken,
    ) -> Result<SuggestionSet, GenerationError>;
}

#[async_trait]
impl<T: Generator + ?Sized> Generator for Arc<T> {
    async fn generate(
        &self,
        query: &str,
        candidates: &[SearchResult],
        cancel: &CancellationToken,
    ) -> Result<SuggestionSet, GenerationError> {
        (**self).generate(query, candidates, cancel).await
    }
}

/// Generator backed by a reasoning service with structured output.
pub struct StructuredGenerator {
    reasoner: Arc<dyn ReasoningClient>,
    policy: GroundingPolicy,
    max_context_chars: usize,
    timeout: Duration,
    temperature: f32,
    max_tokens: u32,
}

impl StructuredGenerator {
    pub fn new(reasoner: Arc<dyn ReasoningClient>, policy: GroundingPolicy) -> Self {
        Self {
            reasoner,
            policy,
            max_context_chars: 24_000,
            timeout: Duration::from_secs(60),
            temperature: 0.1,
            max_tokens: 2000,
        }
    }

    #[must_use]
    pub fn with_max_context_chars(mut self, max_context_chars: usize) -> Self {
        self.max_context_chars = max_context_chars;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn policy(&self) -> GroundingPolicy {
        self.policy
    }

    fn request(&self, query: &str, candidates: &[SearchResult]) -> CompletionRequest {
        let context = build_context(candidates, self.max_context_chars);
        CompletionRequest::new(
            SYSTEM_PROMPT,
            format!(
                "Contexte:\n{context}\n\n---\n\nDiagnostic/symptôme: {query}\n\n\
                 Suggère les codes CIM-10 les plus pertinents."
            ),
        )
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens)
        .with_schema(SUGGESTION_SCHEMA_NAME, suggestion_schema())
    }

    async fn call(&self, request: &CompletionRequest) -> Result<SuggestionSet, GenerationError> {
        let value = self
            .reasoner
            .complete(request)
            .await
            .and_then(|completion| completion.into_structured())
            .map_err(|e| match e {
                CapabilityError::Schema(reason) => GenerationError::SchemaViolation { reason },
                other => GenerationError::Capability(other),
            })?;
        parse_suggestion_set(value)
    }

    /// Applies the grounding policy to a validated set.
    fn enforce_grounding(
        &self,
        mut set: SuggestionSet,
        candidates: &[SearchResult],
    ) -> Result<SuggestionSet, GenerationError> {
        let evidence: HashSet<String> = candidates
            .iter()
            .map(|c| normalize_code(&c.chunk.code))
            .collect();

        let ungrounded: Vec<String> = set
            .codes
            .iter()
            .filter(|s| !evidence.contains(&normalize_code(&s.code)))
            .map(|s| s.code.clone())
            .collect();

        if ungrounded.is_empty() {
            return Ok(set);
        }

        match self.policy {
            GroundingPolicy::Reject => Err(GenerationError::UngroundedSuggestion { codes: ungrounded }),
            GroundingPolicy::Warn => {
                warn!(
                    "GroundingViolation: dropping codes absent from candidates: {}",
                    ungrounded.join(", ")
                );
                set.codes
                    .retain(|s| evidence.contains(&normalize_code(&s.code)));
                set.warnings.extend(ungrounded.iter().map(|code| {
                    format!("Code {code} absent du contexte de référence, retiré des suggestions")
                }));
                Ok(set)
            }
        }
    }
}

#[async_trait]
impl Generator for StructuredGenerator {
    async fn generate(
        &self,
        query: &str,
        candidates: &[SearchResult],
        cancel: &CancellationToken,
    ) -> Result<SuggestionSet, GenerationError> {
        let request = self.request(query, candidates);

        // Timeout and cancellation land in the outer result, answer failures in the inner one
        let set = guard(self.timeout, cancel, async { Ok(self.call(&request).await) }).await??;

        debug!("Generated {} suggestions", set.codes.len());
        self.enforce_grounding(set, candidates)
    }
}

/// Concatenates candidate contexts in rank order within `max_chars`.
///
/// The first candidate is always included, even when it alone exceeds the budget.
pub fn build_context(candidates: &[SearchResult], max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut used = 0;

    for candidate in candidates {
        let part = format!("---\n{}\n", candidate.chunk.raw_context.trim_end());
        let len = part.chars().count();
        if !parts.is_empty() && used + len > max_chars {
            break;
        }
        used += len;
        parts.push(part);
    }

    parts.join("\n")
}

fn normalize_code(code: &str) -> String {
    code.trim().trim_end_matches(['†', '*']).to_uppercase()
}
