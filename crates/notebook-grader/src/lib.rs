//! Notebook grader: sends a bounded notebook summary to a language model and
//! turns its answer into a validated [`EvaluationResponse`].
//!
//! Deterministic parts (parsing, context building, extraction, validation)
//! live in the `grading` crate; this crate owns everything that touches the
//! generation service.
//!
//! - [`config`]: explicit client configuration (env / TOML conveniences)
//! - [`generation`]: retrying structured-JSON client over a [`CompletionBackend`]
//! - [`prompts`]: grading instructions and the user prompt template
//! - [`pipeline`]: parse → context → generate → validate
//! - [`telemetry`]: per-run observability records

pub mod config;
pub mod errors;
pub mod generation;
pub mod pipeline;
pub mod prompts;
pub mod telemetry;

pub use config::{ConfigError, FileConfig, GeneratorConfig, RetryPolicy};
pub use errors::{AttemptError, FailureCategory, GenerationError};
pub use generation::{
    CompletionBackend, CompletionRequest, GenerationClient, OpenAiCompatibleBackend,
    ScriptedBackend, StructuredOptions, StructuredOutput,
};
pub use grading::EvaluationResponse;
pub use pipeline::{evaluate, evaluate_with_report, EvaluateError, EvaluationReport, PipelineLimits};
pub use telemetry::EvaluationTelemetry;
