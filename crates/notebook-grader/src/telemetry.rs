//! Per-evaluation observability records.
//!
//! One [`EvaluationTelemetry`] is produced for every pipeline run, successful
//! or not. The CLI appends it to a JSONL file; nothing reads it back.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::prompts::PROMPT_VERSION;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationOutcome {
    Graded,
    FormatError,
    GenerationError,
    SchemaError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationTelemetry {
    pub filename: String,
    /// Cells kept by the parser (0 if parsing failed).
    pub cells_parsed: usize,
    /// Characters in the rendered notebook context.
    pub context_chars: usize,
    /// Generation attempts made (0 if generation never started).
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub score_total: Option<u8>,
    pub outcome: EvaluationOutcome,
    /// Failure category tag when generation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_category: Option<String>,
    pub prompt_version: String,
    /// RFC 3339 UTC timestamp.
    pub recorded_at: String,
}

impl EvaluationTelemetry {
    /// Start a record for `filename`; counters are filled in as the run progresses.
    pub fn begin(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            cells_parsed: 0,
            context_chars: 0,
            attempts: 0,
            elapsed_ms: 0,
            score_total: None,
            outcome: EvaluationOutcome::Graded,
            failure_category: None,
            prompt_version: PROMPT_VERSION.to_string(),
            recorded_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == EvaluationOutcome::Graded
    }
}

/// Append one record to `path` as a single JSON line, creating missing
/// parent directories.
///
/// Failures are logged and swallowed; telemetry never fails an evaluation.
pub fn append_telemetry(record: &EvaluationTelemetry, path: &Path) {
    if let Err(e) = write_line(record, path) {
        warn!(path = %path.display(), "Failed to record evaluation telemetry: {e}");
        return;
    }
    info!(
        path = %path.display(),
        filename = %record.filename,
        outcome = ?record.outcome,
        failure_category = record.failure_category.as_deref().unwrap_or("-"),
        attempts = record.attempts,
        "Appended evaluation telemetry"
    );
}

fn write_line(record: &EvaluationTelemetry, path: &Path) -> std::io::Result<()> {
    use std::io::Write;

    let line = serde_json::to_string(record)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{line}")
}
