//! Notebook parser: raw `.ipynb` bytes → normalized cells.
//!
//! Real-world notebooks are messy: sources arrive as strings or lists of
//! lines, execution counts are sometimes `null` or floats, outputs can carry
//! megabytes of HTML. Only document-level structural violations are fatal;
//! everything below the `cells` list degrades to defaults.
//!
//! ```text
//! bytes ─lossy utf-8─▶ Value ─▶ {"cells": [...]} ─▶ Vec<NotebookCell>
//!                                   │
//!                                   └─ non-object entries skipped, index kept
//! ```

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Suffix appended to any text that was shortened to respect a character cap.
pub const TRUNCATION_MARKER: &str = "\n...[truncated]";

const DEFAULT_MAX_SOURCE_CHARS: usize = 20_000;
const DEFAULT_MAX_OUTPUT_CHARS: usize = 5_000;
const DEFAULT_MAX_OUTPUTS_PER_CELL: usize = 5;

/// Number of trailing traceback lines kept for `error` outputs.
const TRACEBACK_TAIL_LINES: usize = 3;

/// Document-level structural violations. Always fatal for the request.
#[derive(Debug, Error)]
pub enum NotebookFormatError {
    #[error("Invalid JSON in .ipynb: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Not a valid .ipynb structure: missing 'cells'.")]
    MissingCells,

    #[error("Invalid .ipynb: 'cells' must be a list.")]
    CellsNotList,
}

/// Caps applied while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLimits {
    /// Maximum number of raw cell entries to look at (`None` = all).
    pub max_cells: Option<usize>,
    /// Character cap for each cell's source.
    pub max_source_chars: usize,
    /// Character cap for each output's text.
    pub max_output_chars: usize,
    /// Only the first N raw output entries of a code cell are considered.
    pub max_outputs_per_cell: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_cells: None,
            max_source_chars: DEFAULT_MAX_SOURCE_CHARS,
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
            max_outputs_per_cell: DEFAULT_MAX_OUTPUTS_PER_CELL,
        }
    }
}

/// One rendered output of a code cell.
#[derive(Debug, Clone, PartialEq)]
pub struct NotebookOutput {
    output_type: String,
    text: String,
}

impl NotebookOutput {
    /// Free-form tag such as `stream`, `execute_result`, `display_data`, `error`.
    pub fn output_type(&self) -> &str {
        &self.output_type
    }

    /// Normalized, length-capped display text. Never blank.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// One normalized notebook cell.
///
/// Outputs are only ever populated for `code` cells.
#[derive(Debug, Clone, PartialEq)]
pub struct NotebookCell {
    index: usize,
    cell_type: String,
    source: String,
    execution_count: Option<i64>,
    outputs: Vec<NotebookOutput>,
    metadata: Map<String, Value>,
}

impl NotebookCell {
    /// Position in the original `cells` list, not in the parsed result.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn cell_type(&self) -> &str {
        &self.cell_type
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn execution_count(&self) -> Option<i64> {
        self.execution_count
    }

    pub fn outputs(&self) -> &[NotebookOutput] {
        &self.outputs
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn is_code(&self) -> bool {
        self.cell_type == "code"
    }

    /// All output texts joined by newlines (empty when there are none).
    pub fn output_text(&self) -> String {
        self.outputs
            .iter()
            .map(NotebookOutput::text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Parse raw notebook bytes into normalized cells.
///
/// Invalid UTF-8 sequences are replaced rather than rejected. Fails only when
/// the document is not JSON, is not an object with a `cells` key, or `cells`
/// is not a list.
pub fn parse_notebook(
    bytes: &[u8],
    limits: &ParseLimits,
) -> Result<Vec<NotebookCell>, NotebookFormatError> {
    let text = String::from_utf8_lossy(bytes);
    let raw: Value = serde_json::from_str(&text)?;

    let cells = raw
        .as_object()
        .and_then(|document| document.get("cells"))
        .ok_or(NotebookFormatError::MissingCells)?
        .as_array()
        .ok_or(NotebookFormatError::CellsNotList)?;

    let limit = limits
        .max_cells
        .map_or(cells.len(), |cap| cap.min(cells.len()));

    let parsed: Vec<NotebookCell> = cells
        .iter()
        .take(limit)
        .enumerate()
        .filter_map(|(index, cell)| {
            cell.as_object()
                .map(|cell| parse_cell(index, cell, limits))
        })
        .collect();

    debug!(
        raw_cells = cells.len(),
        parsed_cells = parsed.len(),
        "Parsed notebook"
    );

    Ok(parsed)
}

/// Render any JSON value as display text.
///
/// `null` becomes empty, strings pass through, arrays are concatenated
/// element-wise (notebook sources are stored as lists of lines), and every
/// other value uses its compact JSON rendering.
///
/// Scalars keep their JSON spelling: `true`/`false`, numbers as written, and
/// a `null` element inside a list contributes nothing. Nested objects render
/// as compact JSON, not as a language-specific repr.
pub fn to_display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(to_display_string).collect(),
        other => other.to_string(),
    }
}

/// Cap `text` at `max_chars` characters, appending [`TRUNCATION_MARKER`] when cut.
///
/// A cap of zero yields an empty string.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text.to_string(),
    }
}

fn parse_cell(index: usize, cell: &Map<String, Value>, limits: &ParseLimits) -> NotebookCell {
    let cell_type = match cell.get("cell_type") {
        None | Some(Value::Null) => "unknown".to_string(),
        Some(value) => to_display_string(value),
    };

    let source = truncate_chars(
        field_text(cell, "source").trim(),
        limits.max_source_chars,
    );

    let execution_count = cell.get("execution_count").and_then(Value::as_i64);

    let outputs = if cell_type == "code" {
        cell.get("outputs")
            .and_then(Value::as_array)
            .map(|outputs| {
                outputs
                    .iter()
                    .take(limits.max_outputs_per_cell)
                    .filter_map(Value::as_object)
                    .filter_map(|output| parse_output(output, limits.max_output_chars))
                    .collect()
            })
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    let metadata = cell
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    NotebookCell {
        index,
        cell_type,
        source,
        execution_count,
        outputs,
        metadata,
    }
}

fn parse_output(output: &Map<String, Value>, max_chars: usize) -> Option<NotebookOutput> {
    let output_type = match output.get("output_type") {
        None | Some(Value::Null) => "unknown".to_string(),
        Some(value) => to_display_string(value),
    };

    let parts: Vec<String> = match output.get("output_type").and_then(Value::as_str) {
        Some("stream") => vec![field_text(output, "text")],
        Some("execute_result" | "display_data") => rich_text(output).into_iter().collect(),
        Some("error") => vec![error_text(output)],
        _ => Vec::new(),
    };

    let joined = parts
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let text = truncate_chars(&joined, max_chars);
    if text.trim().is_empty() {
        return None;
    }

    Some(NotebookOutput { output_type, text })
}

/// `text/plain` if the data bundle has it, otherwise `text/html`.
fn rich_text(output: &Map<String, Value>) -> Option<String> {
    let data = output.get("data")?.as_object()?;
    data.get("text/plain")
        .or_else(|| data.get("text/html"))
        .map(to_display_string)
}

fn error_text(output: &Map<String, Value>) -> String {
    let header = format!(
        "[error] {}: {}",
        field_text(output, "ename"),
        field_text(output, "evalue")
    );

    match output.get("traceback").and_then(Value::as_array) {
        Some(traceback) if !traceback.is_empty() => {
            let tail = traceback
                .iter()
                .skip(traceback.len().saturating_sub(TRACEBACK_TAIL_LINES))
                .map(to_display_string)
                .collect::<Vec<_>>()
                .join("\n");
            format!("{header}\n{tail}")
        }
        _ => header,
    }
}

fn field_text(map: &Map<String, Value>, key: &str) -> String {
    map.get(key).map(to_display_string).unwrap_or_default()
}
