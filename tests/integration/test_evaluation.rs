//! Evaluation harness runs against a real pipeline.

use crate::common::{RuleReasoner, SYMPTOM_DOCUMENT, pipeline, plain, shared_index};
use cimsuggest::evaluation::load_cases;
use cimsuggest::{EvaluationCase, run_evaluation};
use std::sync::Arc;
use tempfile::TempDir;

fn cases() -> Vec<EvaluationCase> {
    vec![
        EvaluationCase::new("difficulté respiratoire", &["R06"]),
        EvaluationCase::new("douleur thoracique", &["R07.1"]),
        EvaluationCase::new("fièvre prolongée", &["R50"]),
        EvaluationCase::new("insuffisance rénale", &["I10"]),
    ]
}

#[tokio::test]
async fn test_metrics_over_hits_and_misses() {
    let pipeline = pipeline(shared_index(SYMPTOM_DOCUMENT), Arc::new(RuleReasoner::new()), plain);

    let report = run_evaluation(&pipeline, &cases(), 2).await;

    assert_eq!(report.metrics.case_count, 4);
    assert!((report.metrics.hit_at_3 - 0.75).abs() < 1e-9);
    assert!((report.metrics.hit_at_5 - 0.75).abs() < 1e-9);
    assert!((report.metrics.mean_recall - 0.75).abs() < 1e-9);
    assert!(report.metrics.mean_latency_ms >= 0.0);

    assert_eq!(report.details.len(), 4);
    assert_eq!(report.details[0].suggested, vec!["R06.0"]);
    assert!(report.details[0].hit_at_3);
    assert!(!report.details[3].hit_at_3);
    assert_eq!(report.details[3].suggested, vec!["N17"]);
}

#[tokio::test]
async fn test_failed_query_counts_as_miss_with_error() {
    let pipeline = pipeline(shared_index(SYMPTOM_DOCUMENT), Arc::new(RuleReasoner::new()), plain);
    let cases = vec![
        EvaluationCase::new("toux sèche", &["R05"]),
        EvaluationCase::new("   ", &["R50"]),
    ];

    let report = run_evaluation(&pipeline, &cases, 1).await;

    assert_eq!(report.metrics.case_count, 2);
    assert!((report.metrics.hit_at_3 - 0.5).abs() < 1e-9);
    let failed = &report.details[1];
    assert!(!failed.hit_at_5);
    assert_eq!(failed.recall, 0.0);
    assert_eq!(failed.error.as_ref().unwrap().kind, "INVALID_QUERY");
}

#[tokio::test]
async fn test_report_written_as_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("report.json");
    let pipeline = pipeline(shared_index(SYMPTOM_DOCUMENT), Arc::new(RuleReasoner::new()), plain);

    let report = run_evaluation(&pipeline, &cases(), 4).await;
    report.write_json(&path).unwrap();

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["metrics"]["case_count"], 4);
    assert_eq!(written["details"].as_array().unwrap().len(), 4);
    assert_eq!(written["details"][1]["query"], "douleur thoracique");
}

#[test]
fn test_case_file_round_trips_through_loader() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cases.json");
    std::fs::write(
        &path,
        r#"[
            { "query": "toux sèche", "expected": ["R05"] },
            { "query": "hypertension artérielle", "expected": ["I10", "I15"] }
        ]"#,
    )
    .unwrap();

    let loaded = load_cases(&path).unwrap();

    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[1].expected, vec!["I10", "I15"]);
}
