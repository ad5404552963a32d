//! Notebook Grading Library
//!
//! Deterministic building blocks for grading a Jupyter notebook with a
//! language model. Nothing in this crate talks to the network.
//!
//! - [`notebook`]: parse raw `.ipynb` bytes into normalized cells
//! - [`context`]: serialize a bounded slice of cells into a prompt payload
//! - [`extract`]: recover a single JSON object from free-form model output
//! - [`evaluation`]: validate the model's object into an [`EvaluationResponse`]
//!
//! # Pipeline
//!
//! ```text
//! bytes ──parse──▶ Vec<NotebookCell> ──build──▶ blocks_text ──▶ (model)
//!                                                                 │
//! EvaluationResponse ◀──validate── Map<String, Value> ◀──extract──┘
//! ```

pub mod context;
pub mod evaluation;
pub mod extract;
pub mod notebook;

pub use context::{build_context, ContextLimits};
pub use evaluation::{
    evaluation_schema, validate, EvaluationResponse, Rubric, SchemaError, DEFAULT_EVALUATION_ID,
};
pub use extract::{extract_json_object, ExtractError};
pub use notebook::{
    parse_notebook, to_display_string, truncate_chars, NotebookCell, NotebookFormatError,
    NotebookOutput, ParseLimits, TRUNCATION_MARKER,
};
