//! Shared test doubles for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use cimsuggest::capability::Completion;
use cimsuggest::corpus::is_valid_code;
use cimsuggest::vector::{VectorDimension, VectorError, normalize};
use cimsuggest::{
    CapabilityError, ChunkStore, CompletionRequest, EmbeddingGenerator, IndexSnapshot, Pipeline,
    ReasoningClient, Settings, SharedIndex, VectorIndex, ingest,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

pub const TWO_CODE_DOCUMENT: &str = "R06.0 Dyspnée\nDifficulté respiratoire, essoufflement à l'effort.\n\
R07.1 Douleur thoracique\nDouleur à l'inspiration profonde, point de côté.\n";

pub const SYMPTOM_DOCUMENT: &str = "R00.0 Tachycardie\nRythme cardiaque accéléré.\n\
R05 Toux\nToux chronique ou purulente.\n\
R06.0 Dyspnée\nDifficulté respiratoire, essoufflement.\n\
R07.1 Douleur thoracique\nDouleur à l'inspiration profonde.\n\
R50 Fièvre d'origine inconnue\nÉtat fébrile persistant.\n\
R73.9 Hyperglycémie\nGlycémie élevée, diabète non confirmé.\n\
N17 Insuffisance rénale aiguë\nAltération brutale de la fonction rénale.\n\
I10 Hypertension essentielle\nTension artérielle élevée.\n";

/// Deterministic embedder: each keyword family lights up two dimensions.
pub struct KeywordEmbedder {
    model_name: String,
}

impl KeywordEmbedder {
    const KEYWORDS: &'static [&'static [&'static str]] = &[
        &["respir", "dyspn", "souffle"],
        &["douleur", "thorac"],
        &["fièvre", "fébri"],
        &["toux"],
        &["cardi", "tachy"],
        &["rénal", "rein"],
        &["glyc", "diabèt"],
        &["tension"],
    ];

    pub fn new() -> Self {
        Self::named("keyword-v1")
    }

    pub fn named(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
        }
    }
}

impl EmbeddingGenerator for KeywordEmbedder {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                let mut embedding = vec![0.05; Self::KEYWORDS.len() * 2];
                for (family, stems) in Self::KEYWORDS.iter().enumerate() {
                    if stems.iter().any(|stem| lower.contains(stem)) {
                        embedding[family * 2] = 0.9;
                        embedding[family * 2 + 1] = 0.8;
                    }
                }
                normalize(&mut embedding);
                embedding
            })
            .collect())
    }

    fn dimension(&self) -> VectorDimension {
        VectorDimension::new(Self::KEYWORDS.len() * 2).unwrap()
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

pub fn build_snapshot(document: &str, embedder: &KeywordEmbedder) -> IndexSnapshot {
    let store = ChunkStore::from_chunks(ingest(document).unwrap()).unwrap();
    let vectors = VectorIndex::build(store.as_slice(), embedder, 4, |_| {}).unwrap();
    IndexSnapshot::new(store, vectors).unwrap()
}

pub fn shared_index(document: &str) -> SharedIndex {
    SharedIndex::with_snapshot(build_snapshot(document, &KeywordEmbedder::new()))
}

/// Pipeline over `index` with settings defaults, adjusted by `configure`.
pub fn pipeline(
    index: SharedIndex,
    reasoner: Arc<RuleReasoner>,
    configure: impl FnOnce(&mut Settings),
) -> Pipeline {
    let mut settings = Settings::default();
    configure(&mut settings);
    Pipeline::from_settings(&settings, index, Arc::new(KeywordEmbedder::new()), reasoner)
}

/// Retrieval and generation only.
pub fn plain(settings: &mut Settings) {
    settings.retrieval.expansion = false;
    settings.rerank.enabled = false;
}

type Rule =
    Box<dyn Fn(&CompletionRequest) -> Option<Result<Completion, CapabilityError>> + Send + Sync>;

/// Reasoning double whose answers depend only on the request.
///
/// Without overrides it expands to nothing, reverses the rerank window and
/// suggests the first code of the generation context.
pub struct RuleReasoner {
    rule: Option<Rule>,
    generation_delay: Duration,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl RuleReasoner {
    pub fn new() -> Self {
        Self {
            rule: None,
            generation_delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers with `rule` when it returns `Some`, falling back to the defaults.
    pub fn with_rule<F>(mut self, rule: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Option<Result<Completion, CapabilityError>>
            + Send
            + Sync
            + 'static,
    {
        self.rule = Some(Box::new(rule));
        self
    }

    pub fn with_generation_delay(mut self, delay: Duration) -> Self {
        self.generation_delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    /// Generation requests received so far.
    pub fn generation_requests(&self) -> Vec<CompletionRequest> {
        self.requests()
            .into_iter()
            .filter(|r| schema_name(r) == "suggestion_set")
            .collect()
    }

    fn default_answer(request: &CompletionRequest) -> Result<Completion, CapabilityError> {
        let value = match schema_name(request) {
            "expanded_query" => json!({ "terms": [] }),
            "ranked_indices" => {
                let n = request
                    .user
                    .lines()
                    .filter(|line| line.starts_with('['))
                    .count() as i64;
                json!({ "indices": (0..n).rev().collect::<Vec<_>>() })
            }
            "suggestion_set" => {
                let codes = context_codes(request);
                suggestion_answer(&codes.iter().take(1).map(String::as_str).collect::<Vec<_>>())
            }
            other => return Err(CapabilityError::Fatal(format!("unexpected schema {other}"))),
        };
        Ok(Completion::Structured(value))
    }
}

#[async_trait]
impl ReasoningClient for RuleReasoner {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CapabilityError> {
        self.requests.lock().push(request.clone());

        if schema_name(request) == "suggestion_set" && !self.generation_delay.is_zero() {
            tokio::time::sleep(self.generation_delay).await;
        }

        if let Some(answer) = self.rule.as_ref().and_then(|rule| rule(request)) {
            return answer;
        }
        Self::default_answer(request)
    }

    fn model_name(&self) -> &str {
        "rule-reasoner"
    }
}

pub fn schema_name(request: &CompletionRequest) -> &str {
    request
        .schema
        .as_ref()
        .map(|s| s.name.as_str())
        .unwrap_or("")
}

/// Codes of the candidate blocks in a generation prompt, in prompt order.
pub fn context_codes(request: &CompletionRequest) -> Vec<String> {
    request
        .user
        .split("---\n")
        .skip(1)
        .filter_map(|block| block.split_whitespace().next())
        .filter(|token| is_valid_code(token))
        .map(str::to_string)
        .collect()
}

/// A schema-conformant answer suggesting `codes`.
pub fn suggestion_answer(codes: &[&str]) -> Value {
    json!({
        "codes": codes.iter().map(|code| json!({
            "code": code,
            "label": "Libellé",
            "relevance": "Correspond au contexte",
            "confidence": "high",
            "reference_info": ""
        })).collect::<Vec<_>>(),
        "coding_rules": [],
        "warnings": [],
        "related_codes": []
    })
}
