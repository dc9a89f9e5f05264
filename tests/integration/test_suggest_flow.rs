//! End-to-end suggestion queries over a small ingested document.

use crate::common::{
    RuleReasoner, TWO_CODE_DOCUMENT, context_codes, pipeline, plain, schema_name, shared_index,
    suggestion_answer,
};
use cimsuggest::capability::Completion;
use cimsuggest::{GroundingPolicy, SuggestError, ingest};
use serde_json::json;
use std::sync::Arc;

#[test]
fn test_two_code_document_yields_two_chunks() {
    let chunks = ingest(TWO_CODE_DOCUMENT).unwrap();

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].code, "R06.0");
    assert_eq!(chunks[0].label, "Dyspnée");
    assert_eq!(chunks[1].code, "R07.1");
    assert_eq!(chunks[1].label, "Douleur thoracique");
    assert!(chunks[0].raw_context.contains("essoufflement"));
    assert!(!chunks[0].raw_context.contains("R07.1"));
}

#[tokio::test]
async fn test_respiratory_query_ranks_dyspnea_first() {
    let reasoner = Arc::new(RuleReasoner::new());
    let pipeline = pipeline(shared_index(TWO_CODE_DOCUMENT), Arc::clone(&reasoner), plain);

    let set = pipeline.suggest("difficulté respiratoire").await.unwrap();

    assert_eq!(set.suggested_codes(), vec!["R06.0"]);
    let generation = reasoner.generation_requests();
    assert_eq!(generation.len(), 1);
    assert_eq!(context_codes(&generation[0]), vec!["R06.0", "R07.1"]);
    assert!(generation[0].user.contains("difficulté respiratoire"));
}

#[tokio::test]
async fn test_rerank_order_reaches_generation() {
    // Default rerank answer reverses the window
    let reasoner = Arc::new(RuleReasoner::new());
    let pipeline = pipeline(shared_index(TWO_CODE_DOCUMENT), Arc::clone(&reasoner), |s| {
        s.retrieval.expansion = false;
    });

    let set = pipeline.suggest("difficulté respiratoire").await.unwrap();

    assert_eq!(set.suggested_codes(), vec!["R07.1"]);
    let generation = reasoner.generation_requests();
    assert_eq!(context_codes(&generation[0]), vec!["R07.1", "R06.0"]);
}

#[tokio::test]
async fn test_expansion_terms_steer_retrieval() {
    let reasoner = Arc::new(RuleReasoner::new().with_rule(|request| {
        (schema_name(request) == "expanded_query").then(|| {
            Ok(Completion::Structured(
                json!({ "terms": ["douleur thoracique", "point de côté"] }),
            ))
        })
    }));
    let pipeline = pipeline(shared_index(TWO_CODE_DOCUMENT), Arc::clone(&reasoner), |s| {
        s.rerank.enabled = false;
    });

    let set = pipeline.suggest("gêne en inspirant").await.unwrap();

    assert_eq!(set.suggested_codes(), vec!["R07.1"]);
    let requests = reasoner.requests();
    assert_eq!(schema_name(&requests[0]), "expanded_query");
    assert!(requests[0].user.contains("gêne en inspirant"));
}

#[tokio::test]
async fn test_ungrounded_code_dropped_with_warning() {
    let reasoner = Arc::new(RuleReasoner::new().with_rule(|request| {
        (schema_name(request) == "suggestion_set")
            .then(|| Ok(Completion::Structured(suggestion_answer(&["R06.0", "Z99.9"]))))
    }));
    let pipeline = pipeline(shared_index(TWO_CODE_DOCUMENT), reasoner, |s| {
        plain(s);
        s.generation.grounding = GroundingPolicy::Warn;
    });

    let set = pipeline.suggest("difficulté respiratoire").await.unwrap();

    assert_eq!(set.suggested_codes(), vec!["R06.0"]);
    assert!(set.warnings.iter().any(|w| w.contains("Z99.9")));
}

#[tokio::test]
async fn test_ungrounded_code_rejected_under_strict_policy() {
    let reasoner = Arc::new(RuleReasoner::new().with_rule(|request| {
        (schema_name(request) == "suggestion_set")
            .then(|| Ok(Completion::Structured(suggestion_answer(&["R06.0", "Z99.9"]))))
    }));
    let pipeline = pipeline(shared_index(TWO_CODE_DOCUMENT), reasoner, |s| {
        plain(s);
        s.generation.grounding = GroundingPolicy::Reject;
    });

    let err = pipeline
        .suggest("difficulté respiratoire")
        .await
        .unwrap_err();

    match &err {
        SuggestError::UngroundedSuggestion { codes } => assert_eq!(codes, &vec!["Z99.9".to_string()]),
        other => panic!("expected UngroundedSuggestion, got {other:?}"),
    }
    assert_eq!(err.to_body().kind, "UNGROUNDED_SUGGESTION");
    assert_eq!(err.http_status(), 502);
}

#[tokio::test]
async fn test_invalid_queries_never_reach_capabilities() {
    let reasoner = Arc::new(RuleReasoner::new());
    let pipeline = pipeline(shared_index(TWO_CODE_DOCUMENT), Arc::clone(&reasoner), |_| {});

    let long = "x".repeat(201);
    for query in ["", "   \n\t", long.as_str()] {
        let err = pipeline.suggest(query).await.unwrap_err();
        assert_eq!(err.to_body().kind, "INVALID_QUERY", "query {query:?}");
        assert_eq!(err.http_status(), 400);
    }
    assert!(reasoner.requests().is_empty());
}
