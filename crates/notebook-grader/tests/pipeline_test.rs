//! Pipeline behavior with a scripted generation backend:
//! - filename and defaults are enforced before validation
//! - the score is always recomputed from the rubric
//! - each failure kind surfaces as its own error and telemetry outcome

use std::sync::Arc;

use notebook_grader::pipeline::{evaluate_with_report, EVALUATION_SCHEMA_NAME};
use notebook_grader::telemetry::{append_telemetry, EvaluationOutcome, EvaluationTelemetry};
use notebook_grader::{
    evaluate, EvaluateError, FailureCategory, GenerationClient, PipelineLimits, RetryPolicy,
    ScriptedBackend,
};
use serde_json::json;

fn notebook() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "nbformat": 4,
        "cells": [
            {"cell_type": "markdown", "source": ["# Lab 3\n", "Linear regression"]},
            {
                "cell_type": "code",
                "execution_count": 1,
                "source": "model.fit(X, y)\nmodel.score(X, y)",
                "outputs": [
                    {"output_type": "execute_result", "data": {"text/plain": "0.87"}}
                ]
            }
        ]
    }))
    .unwrap()
}

fn client(backend: &Arc<ScriptedBackend>) -> GenerationClient {
    GenerationClient::with_backend(
        backend.clone(),
        RetryPolicy {
            retries: 2,
            base_delay_ms: 1,
            max_jitter_ms: 1,
        },
        false,
    )
}

#[tokio::test]
async fn prose_wrapped_answer_is_validated_and_rescored() {
    let backend = Arc::new(ScriptedBackend::new(vec![r#"Here you go:
{"id": "run_demo", "filename": "whatever.ipynb", "score_total": 12,
 "rubric": {"correctness": 8, "completeness": 7, "analysis_quality": 6, "structure": 9},
 "issues": [], "feedback": ["Plot the residuals."]}
Good luck!"#
        .to_string()]));

    let response = evaluate(&notebook(), "lab3.ipynb", &client(&backend))
        .await
        .unwrap();

    assert_eq!(response.filename(), "lab3.ipynb");
    assert_eq!(response.id(), "run_demo");
    // 30 / 40 * 100
    assert_eq!(response.score_total(), 75);
    assert_eq!(response.feedback(), ["Plot the residuals."]);
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test]
async fn missing_optional_fields_are_defaulted() {
    let backend = Arc::new(ScriptedBackend::new(vec![json!({
        "rubric": {"correctness": 10, "completeness": 10, "analysis_quality": 10, "structure": 10}
    })
    .to_string()]));

    let response = evaluate(&notebook(), "lab3.ipynb", &client(&backend))
        .await
        .unwrap();

    assert_eq!(response.id(), "run_demo");
    assert_eq!(response.filename(), "lab3.ipynb");
    assert_eq!(response.score_total(), 100);
    assert!(response.issues().is_empty());
    assert!(response.feedback().is_empty());
}

#[tokio::test]
async fn request_carries_schema_and_notebook_context() {
    let backend = Arc::new(ScriptedBackend::new(vec![json!({
        "rubric": {"correctness": 1, "completeness": 1, "analysis_quality": 1, "structure": 1}
    })
    .to_string()]));

    evaluate(&notebook(), "lab3.ipynb", &client(&backend))
        .await
        .unwrap();

    let requests = backend.requests();
    let request = &requests[0];
    assert!(request
        .system
        .contains(&format!("SchemaName: {EVALUATION_SCHEMA_NAME}")));
    assert!(request.system.contains("Strictly follow the schema."));
    assert!(request.system.contains("\"analysis_quality\""));
    assert!(request.user.contains("Notebook filename: lab3.ipynb"));
    assert!(request
        .user
        .contains("[cell 1] type=code\nmodel.fit(X, y)\nmodel.score(X, y)\n\n[output]\n0.87"));
    assert_eq!(request.temperature, 0.0);
}

#[tokio::test]
async fn invalid_notebook_never_reaches_the_model() {
    let backend = Arc::new(ScriptedBackend::new(vec!["{}".to_string()]));

    let err = evaluate(br#"{"metadata": {}}"#, "bad.ipynb", &client(&backend))
        .await
        .unwrap_err();

    assert!(matches!(err, EvaluateError::Format(_)));
    assert_eq!(err.exit_code(), 2);
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn empty_object_fails_validation() {
    // the prompt asks for {} when the model cannot comply
    let backend = Arc::new(ScriptedBackend::new(vec!["{}".to_string()]));

    let report = evaluate_with_report(
        &notebook(),
        "lab3.ipynb",
        &client(&backend),
        &PipelineLimits::default(),
    )
    .await;

    let err = report.result.unwrap_err();
    assert!(matches!(err, EvaluateError::Schema(_)));
    assert_eq!(err.exit_code(), 4);
    assert_eq!(report.telemetry.outcome, EvaluationOutcome::SchemaError);
    assert_eq!(report.telemetry.attempts, 1);
    assert_eq!(report.telemetry.cells_parsed, 2);
}

#[tokio::test]
async fn generation_failure_is_categorized() {
    let backend = Arc::new(ScriptedBackend::failing("HTTP 403 Forbidden: no access"));

    let report = evaluate_with_report(
        &notebook(),
        "lab3.ipynb",
        &client(&backend),
        &PipelineLimits::default(),
    )
    .await;

    match report.result {
        Err(EvaluateError::Generation(err)) => {
            assert_eq!(err.category, FailureCategory::PermissionDenied);
            assert_eq!(err.attempts, 3);
        }
        other => panic!("expected generation error, got {other:?}"),
    }
    assert_eq!(backend.call_count(), 3);
    assert_eq!(report.telemetry.outcome, EvaluationOutcome::GenerationError);
    assert_eq!(
        report.telemetry.failure_category.as_deref(),
        Some("permission_denied")
    );
}

#[tokio::test]
async fn telemetry_lines_accumulate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grader-telemetry.jsonl");

    for _ in 0..2 {
        let backend = Arc::new(ScriptedBackend::new(vec![json!({
            "rubric": {"correctness": 5, "completeness": 5, "analysis_quality": 5, "structure": 5}
        })
        .to_string()]));
        let report = evaluate_with_report(
            &notebook(),
            "lab3.ipynb",
            &client(&backend),
            &PipelineLimits::default(),
        )
        .await;
        assert!(report.result.is_ok());
        append_telemetry(&report.telemetry, &path);
    }

    let content = std::fs::read_to_string(&path).unwrap();
    let records: Vec<EvaluationTelemetry> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.outcome, EvaluationOutcome::Graded);
        assert_eq!(record.score_total, Some(50));
        assert_eq!(record.filename, "lab3.ipynb");
        assert!(record.context_chars > 0);
    }
}
