//! Persisted index round trips and the checks made when loading one.

use crate::common::{
    KeywordEmbedder, RuleReasoner, SYMPTOM_DOCUMENT, build_snapshot, pipeline, plain,
};
use cimsuggest::vector::{IndexMetadata, content_digest};
use cimsuggest::{IndexSnapshot, SharedIndex, VectorError, ingest_file};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_ingest_file_reads_document_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cim10.txt");
    std::fs::write(&path, SYMPTOM_DOCUMENT).unwrap();

    let chunks = ingest_file(&path).unwrap();

    assert_eq!(chunks.len(), 8);
    let codes: Vec<&str> = chunks.iter().map(|c| c.code.as_str()).collect();
    assert_eq!(
        codes,
        vec!["R00.0", "R05", "R06.0", "R07.1", "R50", "R73.9", "N17", "I10"]
    );
}

#[test]
fn test_saved_index_loads_with_same_model() {
    let dir = TempDir::new().unwrap();
    let embedder = KeywordEmbedder::new();
    let snapshot = build_snapshot(SYMPTOM_DOCUMENT, &embedder);

    snapshot
        .save(dir.path(), content_digest(SYMPTOM_DOCUMENT))
        .unwrap();
    let loaded = IndexSnapshot::load(dir.path(), "keyword-v1").unwrap();

    assert_eq!(loaded.store().len(), snapshot.store().len());
    assert_eq!(loaded.vectors().model_name(), "keyword-v1");
    assert_eq!(loaded.vectors().entries(), snapshot.vectors().entries());

    let metadata = IndexMetadata::load(dir.path()).unwrap();
    assert_eq!(metadata.chunk_count, 8);
    assert_eq!(metadata.source_sha256, content_digest(SYMPTOM_DOCUMENT));
}

#[test]
fn test_loading_with_other_model_is_refused() {
    let dir = TempDir::new().unwrap();
    build_snapshot(SYMPTOM_DOCUMENT, &KeywordEmbedder::new())
        .save(dir.path(), content_digest(SYMPTOM_DOCUMENT))
        .unwrap();

    let err = IndexSnapshot::load(dir.path(), "MultilingualE5Small").unwrap_err();

    match err {
        VectorError::EmbeddingVersionMismatch { expected, actual } => {
            assert_eq!(expected, "keyword-v1");
            assert_eq!(actual, "MultilingualE5Small");
        }
        other => panic!("expected EmbeddingVersionMismatch, got {other:?}"),
    }
}

#[test]
fn test_empty_directory_has_no_index() {
    let dir = TempDir::new().unwrap();

    let err = IndexSnapshot::load(dir.path(), "keyword-v1").unwrap_err();

    assert!(matches!(err, VectorError::IndexNotBuilt));
}

#[tokio::test]
async fn test_reloaded_index_answers_like_the_built_one() {
    let dir = TempDir::new().unwrap();
    let snapshot = build_snapshot(SYMPTOM_DOCUMENT, &KeywordEmbedder::new());
    snapshot
        .save(dir.path(), content_digest(SYMPTOM_DOCUMENT))
        .unwrap();

    let reasoner = Arc::new(RuleReasoner::new());
    let built = pipeline(SharedIndex::with_snapshot(snapshot), Arc::clone(&reasoner), plain);
    let reloaded = pipeline(
        SharedIndex::with_snapshot(IndexSnapshot::load(dir.path(), "keyword-v1").unwrap()),
        reasoner,
        plain,
    );

    for query in ["fièvre prolongée", "hypertension artérielle", "glycémie élevée"] {
        assert_eq!(
            built.suggest(query).await.unwrap(),
            reloaded.suggest(query).await.unwrap(),
            "query '{query}'"
        );
    }
}
