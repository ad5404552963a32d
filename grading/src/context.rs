//! Context builder: bounded text payload for the grading prompt.
//!
//! Per-cell caps in the parser are not enough on their own: sixty cells of
//! twenty thousand characters still blow any context window. This module
//! applies the global cap.

use crate::notebook::{NotebookCell, TRUNCATION_MARKER};

/// Separator between rendered cells.
pub const CELL_SEPARATOR: &str = "\n\n---\n\n";

const DEFAULT_MAX_CELLS: usize = 60;
const DEFAULT_MAX_CHARS: usize = 12_000;

/// Caps for [`build_context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLimits {
    /// Only the first N parsed cells are rendered.
    pub max_cells: usize,
    /// Character cap on the joined payload.
    pub max_chars: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            max_cells: DEFAULT_MAX_CELLS,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

/// Render cells as `[cell <index>] type=<cell_type>` blocks.
///
/// Code cells with outputs get an `[output]` section. Earlier cells win: no
/// reordering, the tail is what gets cut.
pub fn build_context(cells: &[NotebookCell], limits: ContextLimits) -> String {
    let blocks: Vec<String> = cells
        .iter()
        .take(limits.max_cells)
        .map(render_cell)
        .collect();

    let text = blocks.join(CELL_SEPARATOR);

    // Unlike the parser's truncation, a zero cap here still carries the marker.
    match text.char_indices().nth(limits.max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text,
    }
}

fn render_cell(cell: &NotebookCell) -> String {
    let mut body = cell.source().to_string();

    if cell.is_code() {
        let outputs = cell.output_text();
        if !outputs.is_empty() {
            body.push_str("\n\n[output]\n");
            body.push_str(&outputs);
        }
    }

    format!("[cell {}] type={}\n{body}", cell.index(), cell.cell_type())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notebook::{parse_notebook, ParseLimits};
    use serde_json::json;

    fn cells(doc: serde_json::Value) -> Vec<NotebookCell> {
        parse_notebook(doc.to_string().as_bytes(), &ParseLimits::default()).unwrap()
    }

    #[test]
    fn test_renders_headers_sources_and_outputs() {
        let cells = cells(json!({
            "cells": [
                {"cell_type": "markdown", "source": "# Intro"},
                "garbage",
                {"cell_type": "code", "source": "print(1)",
                 "outputs": [
                     {"output_type": "stream", "text": "1"},
                     {"output_type": "execute_result", "data": {"text/plain": "None"}}
                 ]}
            ]
        }));

        let text = build_context(&cells, ContextLimits::default());
        assert_eq!(
            text,
            "[cell 0] type=markdown\n# Intro\n\n---\n\n\
             [cell 2] type=code\nprint(1)\n\n[output]\n1\nNone"
        );
    }

    #[test]
    fn test_code_cell_without_outputs_has_no_output_marker() {
        let cells = cells(json!({"cells": [{"cell_type": "code", "source": "x = 1"}]}));
        let text = build_context(&cells, ContextLimits::default());
        assert_eq!(text, "[cell 0] type=code\nx = 1");
        assert!(!text.contains("[output]"));
    }

    #[test]
    fn test_takes_first_max_cells_in_order() {
        let raw: Vec<serde_json::Value> = (0..5)
            .map(|i| json!({"cell_type": "markdown", "source": format!("s{i}")}))
            .collect();
        let cells = cells(json!({ "cells": raw }));

        let text = build_context(
            &cells,
            ContextLimits {
                max_cells: 2,
                ..ContextLimits::default()
            },
        );
        assert!(text.contains("[cell 0]"));
        assert!(text.contains("[cell 1]"));
        assert!(!text.contains("[cell 2]"));
        assert!(text.find("s0").unwrap() < text.find("s1").unwrap());
    }

    #[test]
    fn test_global_cap_appends_marker() {
        let cells = cells(json!({
            "cells": [{"cell_type": "markdown", "source": "y".repeat(500)}]
        }));
        let limits = ContextLimits {
            max_cells: 60,
            max_chars: 100,
        };

        let text = build_context(&cells, limits);
        assert!(text.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            text.chars().count(),
            100 + TRUNCATION_MARKER.chars().count()
        );
    }

    #[test]
    fn test_text_at_exact_cap_is_not_marked() {
        let cells = cells(json!({
            "cells": [
                {"cell_type": "markdown", "source": "é".repeat(40)},
                {"cell_type": "code", "source": "x = 1"}
            ]
        }));
        let full = build_context(&cells, ContextLimits::default());
        let len = full.chars().count();

        let exact = build_context(
            &cells,
            ContextLimits {
                max_cells: 60,
                max_chars: len,
            },
        );
        assert_eq!(exact, full);
        assert!(!exact.ends_with(TRUNCATION_MARKER));

        let one_short = build_context(
            &cells,
            ContextLimits {
                max_cells: 60,
                max_chars: len - 1,
            },
        );
        assert_eq!(
            one_short,
            format!("{}{TRUNCATION_MARKER}", &full[..full.len() - 1])
        );
    }

    #[test]
    fn test_empty_notebook_builds_empty_text() {
        assert_eq!(build_context(&[], ContextLimits::default()), "");
    }
}
