//! Embedding generation for chunks and queries.
//!
//! The embedding capability is pinned to one model: every generator reports
//! the model it runs, and the index refuses query vectors produced by any
//! other model.

use crate::vector::{VectorDimension, VectorError};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Mutex;

/// Trait for generating embeddings from text.
///
/// Implementations must be thread-safe; the index is queried concurrently.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate embeddings for multiple texts, one vector per input.
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Dimension of embeddings produced by this generator.
    #[must_use]
    fn dimension(&self) -> VectorDimension;

    /// Identifier of the model version producing the embeddings.
    #[must_use]
    fn model_name(&self) -> &str;
}

/// Parses a configured model name into a fastembed model.
pub fn parse_embedding_model(name: &str) -> Result<EmbeddingModel, VectorError> {
    match name {
        "AllMiniLML6V2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "AllMiniLML12V2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "BGESmallENV15" => Ok(EmbeddingModel::BGESmallENV15),
        "BGEBaseENV15" => Ok(EmbeddingModel::BGEBaseENV15),
        "MultilingualE5Small" => Ok(EmbeddingModel::MultilingualE5Small),
        "MultilingualE5Base" => Ok(EmbeddingModel::MultilingualE5Base),
        "ParaphraseMLMiniLML12V2" => Ok(EmbeddingModel::ParaphraseMLMiniLML12V2),
        other => Err(VectorError::EmbeddingFailed {
            reason: format!(
                "Unknown embedding model '{other}'. Supported: AllMiniLML6V2, AllMiniLML12V2, BGESmallENV15, BGEBaseENV15, MultilingualE5Small, MultilingualE5Base, ParaphraseMLMiniLML12V2"
            ),
            transient: false,
        }),
    }
}

/// Directory where fastembed caches downloaded model files.
pub fn models_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cimsuggest")
        .join("models")
}

/// Local embedding generator backed by fastembed.
pub struct FastEmbedGenerator {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimension: VectorDimension,
    batch_size: usize,
}

impl std::fmt::Debug for FastEmbedGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedGenerator")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .field("model", &"<TextEmbedding>")
            .finish()
    }
}

impl FastEmbedGenerator {
    /// Loads the named model, downloading it on first use.
    ///
    /// # Errors
    /// Returns an error if the model name is unknown or the model fails to initialize.
    pub fn new(model_name: &str, batch_size: usize, show_progress: bool) -> Result<Self, VectorError> {
        let model = parse_embedding_model(model_name)?;

        let mut text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(models_dir())
                .with_show_download_progress(show_progress),
        )
        .map_err(|e| VectorError::EmbeddingFailed {
            reason: format!(
                "Failed to initialize embedding model: {e}. Ensure you have internet connection for first-time model download"
            ),
            transient: false,
        })?;

        // Probe the dimension with a test embedding
        let probe = text_model
            .embed(vec!["test"], None)
            .map_err(|e| VectorError::EmbeddingFailed {
                reason: e.to_string(),
                transient: false,
            })?;
        let dimension = probe
            .first()
            .map(Vec::len)
            .ok_or_else(|| VectorError::EmbeddingFailed {
                reason: "Model returned no embedding for the probe text".to_string(),
                transient: false,
            })?;

        Ok(Self {
            model: Mutex::new(text_model),
            model_name: model_name.to_string(),
            dimension: VectorDimension::new(dimension)?,
            batch_size: batch_size.max(1),
        })
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();

        let embeddings = self
            .model
            .lock()
            .map_err(|_| VectorError::EmbeddingFailed {
                reason: "Failed to acquire embedding model lock - model may be poisoned"
                    .to_string(),
                transient: false,
            })?
            .embed(text_strings, Some(self.batch_size))
            .map_err(|e| VectorError::EmbeddingFailed {
                reason: format!("Failed to generate embeddings: {e}"),
                transient: false,
            })?;

        if embeddings.len() != texts.len() {
            return Err(VectorError::EmbeddingFailed {
                reason: format!(
                    "Model returned {} embeddings for {} inputs",
                    embeddings.len(),
                    texts.len()
                ),
                transient: false,
            });
        }
        for embedding in &embeddings {
            self.dimension.validate_vector(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Mock embedding generator for testing.
///
/// Produces deterministic unit vectors seeded by clinical keywords so that
/// related texts land close to each other.
#[cfg(test)]
pub struct MockEmbeddingGenerator {
    dimension: VectorDimension,
    model_name: String,
}

#[cfg(test)]
impl Default for MockEmbeddingGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl MockEmbeddingGenerator {
    const KEYWORDS: &'static [(&'static [&'static str], usize)] = &[
        (&["respir", "dyspn", "souffle"], 0),
        (&["douleur", "thorac"], 2),
        (&["fièvre", "fievre", "fébri"], 4),
        (&["toux"], 6),
    ];

    #[must_use]
    pub fn new() -> Self {
        Self {
            dimension: VectorDimension::new(16).expect("non-zero dimension"),
            model_name: "mock-v1".to_string(),
        }
    }

    #[must_use]
    pub fn with_model_name(mut self, name: &str) -> Self {
        self.model_name = name.to_string();
        self
    }
}

#[cfg(test)]
impl EmbeddingGenerator for MockEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        let dim = self.dimension.get();
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                let mut embedding = vec![0.05; dim];
                for (stems, slot) in Self::KEYWORDS {
                    if stems.iter().any(|stem| lower.contains(stem)) {
                        embedding[*slot] = 0.9;
                        embedding[slot + 1] = 0.8;
                    }
                }
                crate::vector::normalize(&mut embedding);
                embedding
            })
            .collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
