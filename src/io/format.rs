//! Machine-readable output for CLI commands.

use crate::error::{ErrorBody, SuggestError};
use crate::io::exit_code::ExitCode;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text (default)
    Text,
    Json,
}

impl OutputFormat {
    #[must_use]
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }

    #[must_use]
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Envelope printed by `--json` commands.
///
/// Exactly one of `data` and `error` is present.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonResponse<T = serde_json::Value>
where
    T: Serialize,
{
    /// "success" or "error"
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    /// `{ kind, message }` of the failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,

    /// HTTP-style status of the failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,

    pub exit_code: u8,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub version: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
}

impl ResponseMeta {
    pub fn now(elapsed_seconds: Option<f64>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: format_utc_timestamp(),
            elapsed_seconds,
        }
    }
}

impl<T> JsonResponse<T>
where
    T: Serialize,
{
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data: Some(data),
            error: None,
            http_status: None,
            exit_code: ExitCode::Success as u8,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: ResponseMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

impl JsonResponse<serde_json::Value> {
    /// Error envelope for a failed query.
    pub fn from_suggest_error(error: &SuggestError) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(error.to_body()),
            http_status: Some(error.http_status()),
            exit_code: ExitCode::from_suggest_error(error) as u8,
            meta: None,
        }
    }

    /// Error envelope for failures outside a query (ingestion, configuration).
    pub fn error(code: ExitCode, kind: &str, message: &str) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(ErrorBody {
                kind: kind.to_string(),
                message: message.to_string(),
            }),
            http_status: None,
            exit_code: code as u8,
            meta: None,
        }
    }
}

/// Current time as "YYYY-MM-DD HH:MM:SS UTC".
pub fn format_utc_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
