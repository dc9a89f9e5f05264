//! Recoverable and terminal stage failures as seen from a whole query.

use crate::common::{
    KeywordEmbedder, RuleReasoner, TWO_CODE_DOCUMENT, context_codes, pipeline, plain, schema_name,
    shared_index,
};
use cimsuggest::capability::Completion;
use cimsuggest::{
    CapabilityError, DirectRetriever, GroundingPolicy, Pipeline, SharedIndex, Stage, SuggestError,
    generation::StructuredGenerator,
};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn rerank_answer(value: serde_json::Value) -> RuleReasoner {
    RuleReasoner::new().with_rule(move |request| {
        (schema_name(request) == "ranked_indices").then(|| Ok(Completion::Structured(value.clone())))
    })
}

fn generation_answer(
    answer: impl Fn() -> Result<Completion, CapabilityError> + Send + Sync + 'static,
) -> RuleReasoner {
    RuleReasoner::new()
        .with_rule(move |request| (schema_name(request) == "suggestion_set").then(&answer))
}

fn rerank_only(settings: &mut cimsuggest::Settings) {
    settings.retrieval.expansion = false;
}

#[tokio::test]
async fn test_duplicate_permutation_falls_back_to_retrieval_order() {
    let reasoner = Arc::new(rerank_answer(json!({ "indices": [0, 0] })));
    let pipeline = pipeline(shared_index(TWO_CODE_DOCUMENT), Arc::clone(&reasoner), rerank_only);

    let set = pipeline.suggest("difficulté respiratoire").await.unwrap();

    assert_eq!(set.suggested_codes(), vec!["R06.0"]);
    let generation = reasoner.generation_requests();
    assert_eq!(context_codes(&generation[0]), vec!["R06.0", "R07.1"]);
}

#[tokio::test]
async fn test_out_of_range_permutation_falls_back() {
    let reasoner = Arc::new(rerank_answer(json!({ "indices": [5, 0] })));
    let pipeline = pipeline(shared_index(TWO_CODE_DOCUMENT), Arc::clone(&reasoner), rerank_only);

    pipeline.suggest("difficulté respiratoire").await.unwrap();

    let generation = reasoner.generation_requests();
    assert_eq!(context_codes(&generation[0]), vec!["R06.0", "R07.1"]);
}

#[tokio::test]
async fn test_rerank_service_failure_falls_back() {
    let reasoner = Arc::new(RuleReasoner::new().with_rule(|request| {
        (schema_name(request) == "ranked_indices")
            .then(|| Err(CapabilityError::Fatal("quota exceeded".to_string())))
    }));
    let pipeline = pipeline(shared_index(TWO_CODE_DOCUMENT), Arc::clone(&reasoner), rerank_only);

    let set = pipeline.suggest("difficulté respiratoire").await.unwrap();

    assert_eq!(set.suggested_codes(), vec!["R06.0"]);
}

#[tokio::test]
async fn test_expansion_failure_falls_back_to_raw_query() {
    let reasoner = Arc::new(RuleReasoner::new().with_rule(|request| {
        (schema_name(request) == "expanded_query")
            .then(|| Err(CapabilityError::Transient("503 Service Unavailable".to_string())))
    }));
    let pipeline = pipeline(shared_index(TWO_CODE_DOCUMENT), Arc::clone(&reasoner), |s| {
        s.rerank.enabled = false;
    });

    let set = pipeline.suggest("difficulté respiratoire").await.unwrap();

    assert_eq!(set.suggested_codes(), vec!["R06.0"]);
    assert_eq!(reasoner.generation_requests().len(), 1);
}

#[tokio::test]
async fn test_missing_fields_surface_as_schema_violation() {
    let reasoner = Arc::new(generation_answer(|| {
        Ok(Completion::Structured(json!({ "codes": [{ "code": "R06.0" }] })))
    }));
    let pipeline = pipeline(shared_index(TWO_CODE_DOCUMENT), reasoner, plain);

    let err = pipeline
        .suggest("difficulté respiratoire")
        .await
        .unwrap_err();

    assert!(matches!(err, SuggestError::SchemaViolation { .. }), "{err:?}");
    assert_eq!(err.stage(), Some(Stage::Generation));
    assert_eq!(err.to_body().kind, "SCHEMA_VIOLATION");
    assert_eq!(err.http_status(), 502);
}

#[tokio::test]
async fn test_non_json_answer_surfaces_as_schema_violation() {
    let reasoner = Arc::new(generation_answer(|| {
        Ok(Completion::Text("Je suggère R06.0 pour la dyspnée.".to_string()))
    }));
    let pipeline = pipeline(shared_index(TWO_CODE_DOCUMENT), reasoner, plain);

    let err = pipeline
        .suggest("difficulté respiratoire")
        .await
        .unwrap_err();

    assert_eq!(err.to_body().kind, "SCHEMA_VIOLATION");
}

#[tokio::test]
async fn test_generation_service_failure_is_terminal() {
    let reasoner = Arc::new(generation_answer(|| {
        Err(CapabilityError::Fatal("invalid api key".to_string()))
    }));
    let pipeline = pipeline(shared_index(TWO_CODE_DOCUMENT), reasoner, plain);

    let err = pipeline
        .suggest("difficulté respiratoire")
        .await
        .unwrap_err();

    assert_eq!(err.to_body().kind, "STAGE_FAILED");
    assert_eq!(err.stage(), Some(Stage::Generation));
    assert_eq!(err.http_status(), 502);
    assert!(err.to_body().message.contains("invalid api key"));
}

#[tokio::test]
async fn test_generation_deadline_maps_to_timeout() {
    let reasoner =
        Arc::new(RuleReasoner::new().with_generation_delay(Duration::from_secs(5)));
    let pipeline = pipeline(shared_index(TWO_CODE_DOCUMENT), reasoner, |s| {
        plain(s);
        s.generation.timeout_ms = 50;
    });

    let started = Instant::now();
    let err = pipeline
        .suggest("difficulté respiratoire")
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(
        matches!(err, SuggestError::Timeout { stage: Stage::Generation, .. }),
        "{err:?}"
    );
    assert_eq!(err.http_status(), 504);
}

#[tokio::test]
async fn test_cancellation_mid_generation() {
    let reasoner =
        Arc::new(RuleReasoner::new().with_generation_delay(Duration::from_secs(5)));
    let pipeline = pipeline(shared_index(TWO_CODE_DOCUMENT), Arc::clone(&reasoner), plain);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = pipeline
        .suggest_with_cancel("difficulté respiratoire", &cancel)
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(
        matches!(err, SuggestError::Cancelled { stage: Stage::Generation }),
        "{err:?}"
    );
    assert_eq!(err.to_body().kind, "CANCELLED");
    // The call was in flight when the token fired
    assert_eq!(reasoner.generation_requests().len(), 1);
}

#[tokio::test]
async fn test_cancelled_before_start_runs_no_stage() {
    let reasoner = Arc::new(RuleReasoner::new());
    let pipeline = pipeline(shared_index(TWO_CODE_DOCUMENT), Arc::clone(&reasoner), |_| {});
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = pipeline
        .suggest_with_cancel("difficulté respiratoire", &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.to_body().kind, "CANCELLED");
    assert!(reasoner.generation_requests().is_empty());
}

#[tokio::test]
async fn test_unbuilt_index_is_reported() {
    let reasoner = Arc::new(RuleReasoner::new());
    let pipeline = pipeline(SharedIndex::empty(), Arc::clone(&reasoner), plain);

    let err = pipeline
        .suggest("difficulté respiratoire")
        .await
        .unwrap_err();

    assert!(matches!(err, SuggestError::IndexNotBuilt));
    assert_eq!(err.to_body().kind, "INDEX_NOT_BUILT");
    assert!(reasoner.requests().is_empty());
}

#[tokio::test]
async fn test_query_embedder_must_match_index_model() {
    let reasoner = Arc::new(RuleReasoner::new());
    let retriever = DirectRetriever::new(
        shared_index(TWO_CODE_DOCUMENT),
        Arc::new(KeywordEmbedder::named("keyword-v2")),
    );
    let generator = StructuredGenerator::new(reasoner, GroundingPolicy::Warn);
    let pipeline = Pipeline::new(Arc::new(retriever), Arc::new(generator));

    let err = pipeline
        .suggest("difficulté respiratoire")
        .await
        .unwrap_err();

    match err {
        SuggestError::EmbeddingVersionMismatch { expected, actual } => {
            assert_eq!(expected, "keyword-v1");
            assert_eq!(actual, "keyword-v2");
        }
        other => panic!("expected EmbeddingVersionMismatch, got {other:?}"),
    }
}
