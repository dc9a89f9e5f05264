//! Configuration module for the code suggestion service.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CIM_` and use double underscores
//! to separate nested levels:
//! - `CIM_RETRIEVAL__TOP_K=20` sets `retrieval.top_k`
//! - `CIM_GENERATION__GROUNDING=reject` sets `generation.grounding`
//! - `CIM_RERANK__ENABLED=false` sets `rerank.enabled`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::generation::GroundingPolicy;

/// Directory holding the settings file and the default index location.
pub const CONFIG_DIR: &str = ".cimsuggest";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory holding chunks, vectors and index metadata
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub reasoning: ReasoningConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub rerank: RerankConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// fastembed model name; the index records it and refuses other models
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Texts per embedding batch during ingestion
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Timeout for embedding one query
    #[serde(default = "default_embedding_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReasoningConfig {
    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_reasoning_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Transport-level timeout for a single HTTP request
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    /// Candidates retrieved per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Enrich queries with related terms before retrieval
    #[serde(default = "default_true")]
    pub expansion: bool,

    #[serde(default = "default_expansion_timeout_ms")]
    pub expansion_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RerankConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Leading candidates shown to the reranker
    #[serde(default = "default_rerank_window")]
    pub window: usize,

    #[serde(default = "default_rerank_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GenerationConfig {
    /// Candidates passed to the generator after reranking
    #[serde(default = "default_context_top_k")]
    pub context_top_k: usize,

    /// Character budget for the candidate context in the prompt
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    /// `warn` drops ungrounded codes, `reject` fails the query
    #[serde(default)]
    pub grounding: GroundingPolicy,

    #[serde(default = "default_generation_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// HTTP server bind address
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Queries processed concurrently
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Longest accepted query text, in characters
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(".cimsuggest/index")
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_embedding_model() -> String {
    "MultilingualE5Small".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_timeout_ms() -> u64 {
    10_000
}
fn default_max_retries() -> usize {
    2
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_reasoning_model() -> String {
    "gpt-4.1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_request_timeout_ms() -> u64 {
    60_000
}
fn default_top_k() -> usize {
    15
}
fn default_expansion_timeout_ms() -> u64 {
    15_000
}
fn default_rerank_window() -> usize {
    20
}
fn default_rerank_timeout_ms() -> u64 {
    30_000
}
fn default_context_top_k() -> usize {
    10
}
fn default_max_context_chars() -> usize {
    24_000
}
fn default_generation_timeout_ms() -> u64 {
    90_000
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_max_concurrency() -> usize {
    4
}
fn default_max_query_chars() -> usize {
    200
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            debug: false,
            embedding: EmbeddingConfig::default(),
            reasoning: ReasoningConfig::default(),
            retrieval: RetrievalConfig::default(),
            rerank: RerankConfig::default(),
            generation: GenerationConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            batch_size: default_batch_size(),
            timeout_ms: default_embedding_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_reasoning_model(),
            api_key_env: default_api_key_env(),
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            expansion: true,
            expansion_timeout_ms: default_expansion_timeout_ms(),
        }
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: default_rerank_window(),
            timeout_ms: default_rerank_timeout_ms(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            context_top_k: default_context_top_k(),
            max_context_chars: default_max_context_chars(),
            grounding: GroundingPolicy::default(),
            timeout_ms: default_generation_timeout_ms(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            max_concurrency: default_max_concurrency(),
            max_query_chars: default_max_query_chars(),
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl RetrievalConfig {
    pub fn expansion_timeout(&self) -> Duration {
        Duration::from_millis(self.expansion_timeout_ms)
    }
}

impl RerankConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .cimsuggest directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        Self::figment(config_path).extract().map_err(Box::new)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref().to_path_buf())
            .extract()
            .map_err(Box::new)
    }

    fn figment(config_path: PathBuf) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels, single underscore
            // stays inside field names
            .merge(Env::prefixed("CIM_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the settings file by walking up from the current directory
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join("settings.toml"));
            }
        }

        None
    }

    /// Check if the workspace has been initialized
    pub fn check_init() -> Result<(), String> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        if !config_path.exists() {
            return Err(
                "No configuration file found. Run 'cimsuggest init' to create one".to_string(),
            );
        }

        Ok(())
    }

    /// Directory containing `.cimsuggest`, searched from the current directory upward.
    pub fn workspace_root() -> Option<PathBuf> {
        Self::find_workspace_config()
            .as_deref()
            .and_then(Path::parent)
            .and_then(Path::parent)
            .map(Path::to_path_buf)
    }

    /// Index directory, with relative paths anchored at the workspace root.
    pub fn index_dir(&self) -> PathBuf {
        if self.index_path.is_absolute() {
            return self.index_path.clone();
        }
        match Self::workspace_root() {
            Some(root) => root.join(&self.index_path),
            None => self.index_path.clone(),
        }
    }

    /// Checks values that deserialize fine but cannot drive a pipeline.
    pub fn validate(&self) -> Result<(), String> {
        let positive = [
            ("retrieval.top_k", self.retrieval.top_k),
            ("rerank.window", self.rerank.window),
            ("generation.context_top_k", self.generation.context_top_k),
            ("embedding.batch_size", self.embedding.batch_size),
            ("server.max_concurrency", self.server.max_concurrency),
            ("server.max_query_chars", self.server.max_query_chars),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(format!("{name} must be at least 1"));
        }
        let timeouts = [
            ("embedding.timeout_ms", self.embedding.timeout_ms),
            ("reasoning.request_timeout_ms", self.reasoning.request_timeout_ms),
            ("retrieval.expansion_timeout_ms", self.retrieval.expansion_timeout_ms),
            ("rerank.timeout_ms", self.rerank.timeout_ms),
            ("generation.timeout_ms", self.generation.timeout_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, ms)| *ms == 0) {
            return Err(format!("{name} must be at least 1 millisecond"));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(format!(
                "generation.temperature must be in [0, 2], got {}",
                self.generation.temperature
            ));
        }
        Ok(())
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&config_path, SETTINGS_TEMPLATE)?;
        Ok(config_path)
    }
}

const SETTINGS_TEMPLATE: &str = r#"# cimsuggest configuration file

# Version of the configuration schema
version = 1

# Directory holding chunks, vectors and index metadata
index_path = ".cimsuggest/index"

# Global debug mode
debug = false

[embedding]
# Local fastembed model. Changing it requires re-running `cimsuggest ingest`.
# Options: MultilingualE5Small, MultilingualE5Base, ParaphraseMLMiniLML12V2,
#          AllMiniLML6V2, AllMiniLML12V2, BGESmallENV15, BGEBaseENV15
model = "MultilingualE5Small"
batch_size = 64
timeout_ms = 10000
max_retries = 2

[reasoning]
# Any OpenAI-compatible chat completions endpoint
base_url = "https://api.openai.com/v1"
model = "gpt-4.1"
# The key itself is read from this environment variable
api_key_env = "OPENAI_API_KEY"
request_timeout_ms = 60000
max_retries = 2

[retrieval]
top_k = 15
# Enrich the query with related terms before retrieval
expansion = true
expansion_timeout_ms = 15000

[rerank]
enabled = true
window = 20
timeout_ms = 30000

[generation]
context_top_k = 10
max_context_chars = 24000
# "warn": drop suggested codes absent from the candidates and add a warning
# "reject": fail the query instead
grounding = "warn"
timeout_ms = 90000
temperature = 0.1
max_tokens = 2000

[server]
bind = "127.0.0.1:8080"
max_concurrency = 4
max_query_chars = 200
"#;
