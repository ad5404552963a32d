//! End-to-end evaluation of one notebook submission.
//!
//! parse → build context → render prompt → structured generation → fill
//! defaults → validate. Every failure propagates as-is; the pipeline has no
//! recovery of its own beyond the generation client's retries.

use std::time::Instant;

use grading::{
    build_context, evaluation_schema, parse_notebook, validate, ContextLimits,
    EvaluationResponse, NotebookFormatError, ParseLimits, SchemaError, DEFAULT_EVALUATION_ID,
};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::errors::GenerationError;
use crate::generation::{GenerationClient, StructuredOptions};
use crate::prompts::{render_user_prompt, SYSTEM_PROMPT};
use crate::telemetry::{EvaluationOutcome, EvaluationTelemetry};

/// Schema name announced to the model alongside the evaluation schema.
pub const EVALUATION_SCHEMA_NAME: &str = "EvaluationResponse";

#[derive(Debug, Error)]
pub enum EvaluateError {
    #[error(transparent)]
    Format(#[from] NotebookFormatError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl EvaluateError {
    /// Process exit code used by the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Format(_) => 2,
            Self::Generation(_) => 3,
            Self::Schema(_) => 4,
        }
    }
}

/// Parser and context caps for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineLimits {
    pub parse: ParseLimits,
    pub context: ContextLimits,
}

/// Result of a run plus its telemetry record, which exists either way.
#[derive(Debug)]
pub struct EvaluationReport {
    pub result: Result<EvaluationResponse, EvaluateError>,
    pub telemetry: EvaluationTelemetry,
}

/// Evaluate a notebook with default limits.
pub async fn evaluate(
    bytes: &[u8],
    filename: &str,
    client: &GenerationClient,
) -> Result<EvaluationResponse, EvaluateError> {
    evaluate_with_report(bytes, filename, client, &PipelineLimits::default())
        .await
        .result
}

/// Evaluate a notebook and report what happened along the way.
pub async fn evaluate_with_report(
    bytes: &[u8],
    filename: &str,
    client: &GenerationClient,
    limits: &PipelineLimits,
) -> EvaluationReport {
    let started = Instant::now();
    let mut telemetry = EvaluationTelemetry::begin(filename);

    let result = run(bytes, filename, client, limits, &mut telemetry).await;

    telemetry.elapsed_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(response) => {
            telemetry.outcome = EvaluationOutcome::Graded;
            telemetry.score_total = Some(response.score_total());
            info!(
                filename,
                score_total = response.score_total(),
                attempts = telemetry.attempts,
                elapsed_ms = telemetry.elapsed_ms,
                "Notebook evaluated"
            );
        }
        Err(EvaluateError::Format(_)) => telemetry.outcome = EvaluationOutcome::FormatError,
        Err(EvaluateError::Generation(err)) => {
            telemetry.outcome = EvaluationOutcome::GenerationError;
            telemetry.attempts = err.attempts;
            telemetry.failure_category = Some(err.category.to_string());
        }
        Err(EvaluateError::Schema(_)) => telemetry.outcome = EvaluationOutcome::SchemaError,
    }

    EvaluationReport { result, telemetry }
}

async fn run(
    bytes: &[u8],
    filename: &str,
    client: &GenerationClient,
    limits: &PipelineLimits,
    telemetry: &mut EvaluationTelemetry,
) -> Result<EvaluationResponse, EvaluateError> {
    let cells = parse_notebook(bytes, &limits.parse)?;
    telemetry.cells_parsed = cells.len();

    let blocks_text = build_context(&cells, limits.context);
    telemetry.context_chars = blocks_text.chars().count();
    debug!(
        cells = cells.len(),
        context_chars = telemetry.context_chars,
        "Notebook context built"
    );

    let user_prompt = render_user_prompt(filename, &blocks_text);
    let options = StructuredOptions {
        schema: Some(evaluation_schema()),
        schema_name: EVALUATION_SCHEMA_NAME.to_string(),
        strict: true,
        ..StructuredOptions::default()
    };

    let output = client
        .generate_structured_with_attempts(SYSTEM_PROMPT, &user_prompt, &options)
        .await?;
    telemetry.attempts = output.attempts;

    let object = apply_submission_defaults(output.object, filename);
    Ok(validate(object)?)
}

/// The submitted filename always wins; `id`, `issues` and `feedback` are
/// filled in only when the model left them out.
fn apply_submission_defaults(mut object: Map<String, Value>, filename: &str) -> Map<String, Value> {
    object.insert("filename".to_string(), Value::String(filename.to_string()));
    object
        .entry("id")
        .or_insert_with(|| Value::String(DEFAULT_EVALUATION_ID.to_string()));
    object
        .entry("issues")
        .or_insert_with(|| Value::Array(Vec::new()));
    object
        .entry("feedback")
        .or_insert_with(|| Value::Array(Vec::new()));
    object
}
