//! The main library module for cimsuggest
//!
//! Suggests ICD-10 (CIM-10) diagnostic codes for a free-text query by
//! retrieving candidate chunks from a reference corpus, optionally reranking
//! them, and asking a reasoning service for a schema-constrained answer
//! grounded in those candidates.

pub mod capability;
pub mod config;
pub mod corpus;
pub mod display;
pub mod error;
pub mod evaluation;
pub mod generation;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod rerank;
pub mod retrieval;
#[cfg(feature = "http-server")]
pub mod server;
pub mod vector;

// Explicit exports for better API clarity
pub use capability::{CompletionRequest, OpenAiReasoner, ReasoningClient};
pub use config::Settings;
pub use corpus::{Chunk, ChunkId, ChunkStore, ingest, ingest_file};
pub use error::{
    CapabilityError, CorpusError, CorpusResult, ErrorBody, EvaluationError, GenerationError,
    RerankError, RetrievalError, Stage, SuggestError, SuggestResult,
};
pub use evaluation::{EvaluationCase, EvaluationMetrics, EvaluationReport, run_evaluation};
pub use generation::{CodeSuggestion, Confidence, Generator, GroundingPolicy, SuggestionSet};
pub use pipeline::{Pipeline, PipelineOptions};
pub use rerank::{LlmReranker, Reranker};
pub use retrieval::{DirectRetriever, ExpandedRetriever, Retriever, SearchResult};
pub use vector::{
    EmbeddingGenerator, FastEmbedGenerator, IndexSnapshot, SharedIndex, VectorError, VectorIndex,
};
