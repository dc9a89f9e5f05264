//! Concurrent queries against one pipeline must behave like sequential ones.

use crate::common::{
    KeywordEmbedder, RuleReasoner, SYMPTOM_DOCUMENT, TWO_CODE_DOCUMENT, build_snapshot, pipeline,
    shared_index,
};
use cimsuggest::SuggestionSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const QUERIES: &[&str] = &[
    "difficulté respiratoire",
    "douleur thoracique",
    "fièvre prolongée",
    "toux sèche",
    "tachycardie",
    "insuffisance rénale",
    "hyperglycémie",
    "hypertension artérielle",
    "essoufflement",
    "état fébrile",
];

fn fifty_queries() -> Vec<&'static str> {
    QUERIES.iter().cycle().take(50).copied().collect()
}

async fn sequential(pipeline: &cimsuggest::Pipeline, queries: &[&str]) -> Vec<SuggestionSet> {
    let mut results = Vec::with_capacity(queries.len());
    for query in queries {
        results.push(pipeline.suggest(query).await.unwrap());
    }
    results
}

#[tokio::test]
async fn test_bounded_fan_out_matches_sequential_results() {
    let reasoner = Arc::new(RuleReasoner::new().with_generation_delay(Duration::from_millis(5)));
    let pipeline = pipeline(shared_index(SYMPTOM_DOCUMENT), reasoner, |_| {});
    let queries = fifty_queries();

    let expected = sequential(&pipeline, &queries).await;
    let concurrent = pipeline
        .suggest_many(&queries[..], 8, &CancellationToken::new())
        .await;

    assert_eq!(concurrent.len(), 50);
    for (i, (got, want)) in concurrent.into_iter().zip(&expected).enumerate() {
        assert_eq!(&got.unwrap(), want, "query {i} '{}'", queries[i]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_spawned_queries_match_sequential_results() {
    let reasoner = Arc::new(RuleReasoner::new().with_generation_delay(Duration::from_millis(5)));
    let pipeline = Arc::new(pipeline(shared_index(SYMPTOM_DOCUMENT), reasoner, |_| {}));
    let queries = fifty_queries();

    let expected = sequential(&pipeline, &queries).await;

    let handles: Vec<_> = queries
        .iter()
        .map(|query| {
            let pipeline = Arc::clone(&pipeline);
            let query = query.to_string();
            tokio::spawn(async move { pipeline.suggest(&query).await })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let got = handle.await.unwrap().unwrap();
        assert_eq!(got, expected[i], "query {i} '{}'", queries[i]);
    }
}

#[tokio::test]
async fn test_distinct_queries_get_distinct_answers() {
    let reasoner = Arc::new(RuleReasoner::new());
    let pipeline = pipeline(shared_index(SYMPTOM_DOCUMENT), reasoner, |s| {
        s.retrieval.expansion = false;
        s.rerank.enabled = false;
    });

    let results = pipeline
        .suggest_many(&["toux sèche", "insuffisance rénale"][..], 2, &CancellationToken::new())
        .await;

    assert_eq!(results[0].as_ref().unwrap().suggested_codes(), vec!["R05"]);
    assert_eq!(results[1].as_ref().unwrap().suggested_codes(), vec!["N17"]);
}

#[tokio::test]
async fn test_cancelling_batch_fails_every_pending_query() {
    let reasoner = Arc::new(RuleReasoner::new().with_generation_delay(Duration::from_secs(5)));
    let pipeline = pipeline(shared_index(SYMPTOM_DOCUMENT), reasoner, |_| {});
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let queries = fifty_queries();
    let results = pipeline.suggest_many(&queries[..], 8, &cancel).await;

    assert_eq!(results.len(), 50);
    assert!(
        results
            .iter()
            .all(|r| matches!(r, Err(e) if e.to_body().kind == "CANCELLED"))
    );
}

#[tokio::test]
async fn test_index_swap_leaves_held_snapshot_intact() {
    let index = shared_index(TWO_CODE_DOCUMENT);
    let reasoner = Arc::new(RuleReasoner::new());
    let pipeline = pipeline(index.clone(), reasoner, |s| {
        s.retrieval.expansion = false;
        s.rerank.enabled = false;
    });

    let before = pipeline.suggest("toux sèche").await.unwrap();
    assert_ne!(before.suggested_codes(), vec!["R05"]);

    let held = index.snapshot().unwrap();
    index.install(build_snapshot(SYMPTOM_DOCUMENT, &KeywordEmbedder::new()));

    assert_eq!(held.store().len(), 2);
    assert_eq!(index.snapshot().unwrap().store().len(), 8);

    let after = pipeline.suggest("toux sèche").await.unwrap();
    assert_eq!(after.suggested_codes(), vec!["R05"]);
}
