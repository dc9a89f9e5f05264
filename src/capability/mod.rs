//! External reasoning capability used by expansion, reranking and generation.
//!
//! The service is opaque: it receives a prompt and an optional JSON schema and
//! answers with free text or a schema-conformant object. Callers never trust a
//! structured payload blindly; each stage validates what it receives.

mod guard;
mod openai;

pub use guard::{RetryPolicy, guard, retry_transient};
pub use openai::OpenAiReasoner;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CapabilityError;

/// JSON schema the response must conform to.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    /// Identifier sent to the service alongside the schema
    pub name: String,
    pub schema: Value,
}

/// One prompt sent to a reasoning service.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub schema: Option<ResponseSchema>,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.0,
            max_tokens: 1024,
            schema: None,
        }
    }

    #[must_use]
    pub fn with_schema(mut self, name: &str, schema: Value) -> Self {
        self.schema = Some(ResponseSchema {
            name: name.to_string(),
            schema,
        });
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
}

/// Answer of a reasoning service.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Text(String),
    Structured(Value),
}

impl Completion {
    /// Returns the structured payload, parsing text answers as JSON.
    ///
    /// # Errors
    /// [`CapabilityError::Schema`] when the answer is not a JSON value.
    pub fn into_structured(self) -> Result<Value, CapabilityError> {
        match self {
            Self::Structured(value) => Ok(value),
            Self::Text(text) => serde_json::from_str(text.trim())
                .map_err(|e| CapabilityError::Schema(format!("Response is not JSON: {e}"))),
        }
    }
}

/// A reasoning service reachable over some transport.
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CapabilityError>;

    /// Model identifier, for logs.
    fn model_name(&self) -> &str;
}

#[async_trait]
impl<T: ReasoningClient + ?Sized> ReasoningClient for std::sync::Arc<T> {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CapabilityError> {
        (**self).complete(request).await
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Scripted reasoning client for tests.
///
/// Answers are popped in order; an exhausted script fails with a fatal error.
#[cfg(test)]
pub(crate) struct MockReasoningClient {
    responses: parking_lot::Mutex<std::collections::VecDeque<Result<Completion, CapabilityError>>>,
    requests: parking_lot::Mutex<Vec<CompletionRequest>>,
    delay: Option<std::time::Duration>,
}

#[cfg(test)]
impl MockReasoningClient {
    pub fn new() -> Self {
        Self {
            responses: parking_lot::Mutex::new(Default::default()),
            requests: parking_lot::Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Every call sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_json(self, value: Value) -> Self {
        self.responses.lock().push_back(Ok(Completion::Structured(value)));
        self
    }

    pub fn push_text(self, text: &str) -> Self {
        self.responses
            .lock()
            .push_back(Ok(Completion::Text(text.to_string())));
        self
    }

    pub fn push_error(self, error: CapabilityError) -> Self {
        self.responses.lock().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl ReasoningClient for MockReasoningClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CapabilityError> {
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(CapabilityError::Fatal("no scripted response".to_string())))
    }

    fn model_name(&self) -> &str {
        "mock-reasoner"
    }
}
