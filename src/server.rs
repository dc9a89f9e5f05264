//! HTTP query surface.
//!
//! - `POST /suggest` takes `{ "text": ... }` and answers
//!   `{ "result": SuggestionSet, "elapsed_seconds": f64 }`, or an
//!   `{ kind, message }` body with the mapped status on failure.
//! - `GET /health` reports whether an index is loaded.

use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::error::{ErrorBody, SuggestError};
use crate::generation::SuggestionSet;
use crate::pipeline::Pipeline;
use crate::vector::SharedIndex;

#[derive(Debug, Deserialize)]
pub struct SuggestRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuggestResponse {
    pub result: SuggestionSet,
    pub elapsed_seconds: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub pipeline_ready: bool,
    pub chunks: usize,
}

/// Shared handler state. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    index: SharedIndex,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl AppState {
    /// `max_concurrency` bounds queries in flight across all connections.
    pub fn new(pipeline: Arc<Pipeline>, index: SharedIndex, max_concurrency: usize) -> Self {
        Self {
            pipeline,
            index,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token cancelling every in-flight query when the server stops.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/suggest", post(suggest))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

fn error_response(status: StatusCode, body: ErrorBody) -> Response {
    (status, Json(body)).into_response()
}

fn suggest_error_response(error: &SuggestError) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    error_response(status, error.to_body())
}

async fn suggest(
    State(state): State<AppState>,
    payload: Result<Json<SuggestRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return suggest_error_response(&SuggestError::InvalidQuery {
                reason: rejection.body_text(),
            });
        }
    };

    let Ok(_permit) = state.permits.acquire().await else {
        return suggest_error_response(&SuggestError::Cancelled {
            stage: crate::error::Stage::Retrieval,
        });
    };

    let started = Instant::now();
    let cancel = state.shutdown.child_token();
    match state.pipeline.suggest_with_cancel(&request.text, &cancel).await {
        Ok(result) => Json(SuggestResponse {
            result,
            elapsed_seconds: started.elapsed().as_secs_f64(),
        })
        .into_response(),
        Err(e) => {
            warn!("Query failed ({}): {e}", e.kind());
            suggest_error_response(&e)
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let chunks = state
        .index
        .snapshot()
        .map(|snapshot| snapshot.store().len())
        .unwrap_or(0);

    Json(HealthResponse {
        status: "ok".to_string(),
        pipeline_ready: state.index.is_built(),
        chunks,
    })
}

/// Binds `bind` and serves until Ctrl+C, then cancels queries still in flight.
pub async fn serve(state: AppState, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Listening on http://{bind}");
    info!("Query endpoint: POST http://{bind}/suggest");
    info!("Health check: GET http://{bind}/health");

    let shutdown = state.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutting down HTTP server"),
            Err(e) => warn!("Failed to listen for Ctrl+C: {e}"),
        }
        shutdown.cancel();
    });

    serve_on(listener, state).await
}

/// Serves on `listener` until the state's shutdown token is cancelled.
///
/// Queries in flight see the cancellation through their own child token and
/// answer with a `CANCELLED` body before the connection closes.
pub async fn serve_on(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    let shutdown = state.shutdown_token();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
