//! Evaluation harness: runs labelled cases through a pipeline and aggregates
//! hit@3, hit@5, recall and latency.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{ErrorBody, EvaluationError};
use crate::pipeline::Pipeline;

/// A query with the codes a correct answer should contain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationCase {
    pub query: String,
    pub expected: Vec<String>,
}

impl EvaluationCase {
    pub fn new(query: impl Into<String>, expected: &[&str]) -> Self {
        Self {
            query: query.into(),
            expected: expected.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Outcome of one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    pub query: String,
    pub expected: Vec<String>,
    /// First five suggested codes
    pub suggested: Vec<String>,
    pub hit_at_3: bool,
    pub hit_at_5: bool,
    pub recall: f64,
    pub latency_ms: f64,
    /// Set when the query failed; the case then counts as a miss
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub hit_at_3: f64,
    pub hit_at_5: f64,
    pub mean_recall: f64,
    pub mean_latency_ms: f64,
    pub case_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub metrics: EvaluationMetrics,
    pub details: Vec<CaseReport>,
}

impl EvaluationReport {
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), EvaluationError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(EvaluationError::Serialize)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| EvaluationError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, json).map_err(|source| EvaluationError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Prefix-tolerant comparison: `I48` matches `I48.0` and the other way round.
pub fn code_matches(suggested: &str, expected: &str) -> bool {
    let suggested = suggested.trim().to_uppercase();
    let expected = expected.trim().to_uppercase();
    if suggested.is_empty() || expected.is_empty() {
        return false;
    }
    suggested.starts_with(&expected) || expected.starts_with(&suggested)
}

/// Scores suggested codes against a case.
pub fn score_case(case: &EvaluationCase, suggested: &[String], latency_ms: f64) -> CaseReport {
    let hit_within = |n: usize| {
        suggested
            .iter()
            .take(n)
            .any(|s| case.expected.iter().any(|e| code_matches(s, e)))
    };

    let recall = if case.expected.is_empty() {
        0.0
    } else {
        let found = case
            .expected
            .iter()
            .filter(|e| suggested.iter().any(|s| code_matches(s, e)))
            .count();
        found as f64 / case.expected.len() as f64
    };

    CaseReport {
        query: case.query.clone(),
        expected: case.expected.clone(),
        suggested: suggested.iter().take(5).cloned().collect(),
        hit_at_3: hit_within(3),
        hit_at_5: hit_within(5),
        recall,
        latency_ms,
        error: None,
    }
}

/// Averages case reports. An empty slice yields zeroed metrics.
pub fn aggregate(details: &[CaseReport]) -> EvaluationMetrics {
    let n = details.len();
    if n == 0 {
        return EvaluationMetrics {
            hit_at_3: 0.0,
            hit_at_5: 0.0,
            mean_recall: 0.0,
            mean_latency_ms: 0.0,
            case_count: 0,
        };
    }

    let rate = |hit: fn(&CaseReport) -> bool| details.iter().filter(|r| hit(r)).count() as f64 / n as f64;
    EvaluationMetrics {
        hit_at_3: rate(|r| r.hit_at_3),
        hit_at_5: rate(|r| r.hit_at_5),
        mean_recall: details.iter().map(|r| r.recall).sum::<f64>() / n as f64,
        mean_latency_ms: details.iter().map(|r| r.latency_ms).sum::<f64>() / n as f64,
        case_count: n,
    }
}

/// Runs every case, at most `concurrency` at a time.
///
/// A failing query does not stop the run: it is recorded as a miss with zero
/// recall and its error attached.
pub async fn run_evaluation(
    pipeline: &Pipeline,
    cases: &[EvaluationCase],
    concurrency: usize,
) -> EvaluationReport {
    let cancel = CancellationToken::new();
    let total = cases.len();

    let details: Vec<CaseReport> = stream::iter(cases.iter().enumerate().map(|(i, case)| {
        let cancel = &cancel;
        async move {
            let started = Instant::now();
            let outcome = pipeline.suggest_with_cancel(&case.query, cancel).await;
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            match outcome {
                Ok(set) => {
                    let suggested: Vec<String> = set.codes.into_iter().map(|c| c.code).collect();
                    let report = score_case(case, &suggested, latency_ms);
                    info!(
                        "[{}/{total}] {} '{}' expected {:?}, got {:?}",
                        i + 1,
                        if report.hit_at_3 { "hit" } else { "miss" },
                        case.query,
                        case.expected,
                        report.suggested
                    );
                    report
                }
                Err(e) => {
                    warn!("[{}/{total}] '{}' failed: {e}", i + 1, case.query);
                    let mut report = score_case(case, &[], latency_ms);
                    report.error = Some(e.to_body());
                    report
                }
            }
        }
    }))
    .buffered(concurrency.max(1))
    .collect()
    .await;

    EvaluationReport {
        metrics: aggregate(&details),
        details,
    }
}

/// Reads cases from a JSON array of `{ "query", "expected" }` objects.
pub fn load_cases(path: impl AsRef<Path>) -> Result<Vec<EvaluationCase>, EvaluationError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| EvaluationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let cases: Vec<EvaluationCase> =
        serde_json::from_str(&content).map_err(|source| EvaluationError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    if let Some((index, case)) = cases
        .iter()
        .enumerate()
        .find(|(_, c)| c.expected.iter().all(|e| e.trim().is_empty()))
    {
        return Err(EvaluationError::EmptyExpectation {
            index,
            query: case.query.clone(),
        });
    }

    Ok(cases)
}

/// Built-in validation set.
pub fn default_cases() -> Vec<EvaluationCase> {
    vec![
        EvaluationCase::new("Dyspnée à l'effort", &["R06.0"]),
        EvaluationCase::new("Toux purulente", &["R05"]),
        EvaluationCase::new("Fièvre", &["R50"]),
        EvaluationCase::new("Œdème des membres inférieurs", &["R60"]),
        EvaluationCase::new("Hyponatrémie", &["E87.1"]),
        EvaluationCase::new("Hypercalcémie", &["E83.5"]),
        EvaluationCase::new("Tachycardie", &["R00.0"]),
        EvaluationCase::new("Détresse respiratoire aiguë", &["J96.0", "J80"]),
        EvaluationCase::new("Hypertension artérielle", &["I10"]),
        EvaluationCase::new("Diabète de type 2", &["E11"]),
        EvaluationCase::new("Fibrillation auriculaire", &["I48"]),
        EvaluationCase::new("Infection pulmonaire à Haemophilus influenzae", &["J14"]),
        EvaluationCase::new("Dyslipidémie", &["E78"]),
        EvaluationCase::new("Insuffisance rénale aiguë", &["N17"]),
        EvaluationCase::new("Pneumopathie à Haemophilus influenzae", &["J14"]),
    ]
}
