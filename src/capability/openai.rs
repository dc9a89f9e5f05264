//! OpenAI-compatible chat completions client.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use super::{Completion, CompletionRequest, ReasoningClient, RetryPolicy, retry_transient};
use crate::config::ReasoningConfig;
use crate::error::CapabilityError;

/// Reasoning client talking to `/chat/completions` of an OpenAI-compatible API.
///
/// When a request carries a schema it is sent as a strict `json_schema`
/// response format and the answer is returned as [`Completion::Structured`].
#[derive(Debug, Clone)]
pub struct OpenAiReasoner {
    client: Client,
    endpoint: String,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiReasoner {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: String,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, CapabilityError> {
        if api_key.trim().is_empty() {
            return Err(CapabilityError::Fatal("missing API key".to_string()));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| CapabilityError::Fatal("invalid API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| CapabilityError::Fatal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model,
            retry,
        })
    }

    /// Builds a client from configuration, reading the key from `api_key_env`.
    pub fn from_config(config: &ReasoningConfig) -> Result<Self, CapabilityError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            CapabilityError::Fatal(format!(
                "environment variable {} is not set",
                config.api_key_env
            ))
        })?;

        Self::new(
            &api_key,
            &config.base_url,
            config.model.clone(),
            Duration::from_millis(config.request_timeout_ms),
            RetryPolicy::new(config.max_retries),
        )
    }

    async fn send_once(&self, body: &ChatRequest<'_>) -> Result<ChatResponse, CapabilityError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(classify_status(status, &text));
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| CapabilityError::Transient(format!("failed to decode response: {e}")))
    }
}

#[async_trait]
impl ReasoningClient for OpenAiReasoner {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CapabilityError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            response_format: request.schema.as_ref().map(|schema| {
                json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": schema.name,
                        "schema": schema.schema,
                        "strict": true,
                    }
                })
            }),
        };

        let body = &body;
        let response =
            retry_transient(self.retry, "chat completion", move || self.send_once(body)).await?;

        let message = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| CapabilityError::Transient("response has no choices".to_string()))?;

        if let Some(refusal) = message.refusal {
            return Err(CapabilityError::Schema(format!("model refused: {refusal}")));
        }
        let content = message.content.unwrap_or_default();
        debug!("{} answered with {} chars", self.model, content.len());

        if request.schema.is_some() {
            let value = serde_json::from_str(content.trim())
                .map_err(|e| CapabilityError::Schema(format!("response is not JSON: {e}")))?;
            Ok(Completion::Structured(value))
        } else {
            Ok(Completion::Text(content))
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn classify_status(status: StatusCode, body: &str) -> CapabilityError {
    let message = format!("service returned {status}: {body}");
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        CapabilityError::Transient(message)
    } else {
        CapabilityError::Fatal(message)
    }
}

fn classify_transport_error(err: reqwest::Error) -> CapabilityError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        CapabilityError::Transient(err.to_string())
    } else {
        CapabilityError::Fatal(err.to_string())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}
