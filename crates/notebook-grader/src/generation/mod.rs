//! Structured-JSON generation over a pluggable completion backend.
//!
//! [`GenerationClient`] owns the retry loop and JSON extraction;
//! a [`CompletionBackend`] only turns one request into raw reply text.

mod backend;
mod client;
mod scripted;

pub use backend::{CompletionBackend, CompletionRequest, OpenAiCompatibleBackend};
pub use client::{GenerationClient, StructuredOptions, StructuredOutput};
pub use scripted::ScriptedBackend;
