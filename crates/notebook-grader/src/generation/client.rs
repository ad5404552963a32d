use std::sync::Arc;

use grading::extract_json_object;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::backend::{CompletionBackend, CompletionRequest, OpenAiCompatibleBackend};
use crate::config::{ConfigError, GeneratorConfig, RetryPolicy};
use crate::errors::{AttemptError, GenerationError};

const JSON_RULES: &str = "You MUST output ONLY valid JSON. No prose. No markdown. No code fences. \
Return exactly one JSON object.";

/// Knobs for one structured generation.
#[derive(Debug, Clone)]
pub struct StructuredOptions {
    /// Schema embedded into the system instructions. Not enforced on the reply.
    pub schema: Option<Value>,
    pub schema_name: String,
    /// Whether the instructions demand strict schema adherence.
    pub strict: bool,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for StructuredOptions {
    fn default() -> Self {
        Self {
            schema: None,
            schema_name: "response".to_string(),
            strict: true,
            temperature: 0.0,
            max_tokens: 2048,
        }
    }
}

/// A JSON object recovered from the model and the attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredOutput {
    pub object: Map<String, Value>,
    pub attempts: u32,
}

/// Retrying client that asks a backend for exactly one JSON object.
pub struct GenerationClient {
    backend: Arc<dyn CompletionBackend>,
    retry: RetryPolicy,
    debug: bool,
}

impl GenerationClient {
    /// Client over the OpenAI-compatible HTTP backend described by `config`.
    pub fn new(config: &GeneratorConfig) -> Result<Self, ConfigError> {
        let backend = OpenAiCompatibleBackend::new(config)?;
        Ok(Self::with_backend(
            Arc::new(backend),
            config.retry.clone(),
            config.debug,
        ))
    }

    pub fn with_backend(backend: Arc<dyn CompletionBackend>, retry: RetryPolicy, debug: bool) -> Self {
        Self {
            backend,
            retry,
            debug,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Ask for one JSON object; see [`Self::generate_structured_with_attempts`].
    pub async fn generate_structured(
        &self,
        system: &str,
        user: &str,
        options: &StructuredOptions,
    ) -> Result<Map<String, Value>, GenerationError> {
        self.generate_structured_with_attempts(system, user, options)
            .await
            .map(|output| output.object)
    }

    /// Send the request up to `retries + 1` times, sleeping with exponential
    /// backoff plus jitter between attempts. Any failure (transport, status,
    /// malformed payload, no JSON object in the reply) triggers a retry.
    pub async fn generate_structured_with_attempts(
        &self,
        system: &str,
        user: &str,
        options: &StructuredOptions,
    ) -> Result<StructuredOutput, GenerationError> {
        let request = CompletionRequest {
            system: compose_system_prompt(system, options),
            user: user.to_string(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let max_attempts = self.retry.max_attempts();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            if self.debug {
                info!(
                    backend = self.backend.name(),
                    attempt,
                    max_attempts,
                    "Requesting structured completion"
                );
            }

            match self.attempt_once(&request).await {
                Ok(object) => {
                    debug!(attempt, keys = object.len(), "Structured completion parsed");
                    return Ok(StructuredOutput { object, attempts: attempt });
                }
                Err(err) => {
                    if self.debug {
                        warn!(attempt, max_attempts, error_kind = err.kind(), error = %err, "Generation attempt failed");
                    } else {
                        debug!(attempt, max_attempts, error_kind = err.kind(), error = %err, "Generation attempt failed");
                    }

                    if attempt >= max_attempts {
                        let failure = GenerationError::from_last_error(err, attempt);
                        warn!(
                            attempts = attempt,
                            category = %failure.category,
                            "Generation failed after all attempts"
                        );
                        return Err(failure);
                    }

                    let delay = self.retry.backoff(attempt - 1);
                    debug!(delay_ms = delay.as_millis() as u64, "Backing off before retry");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt_once(&self, request: &CompletionRequest) -> Result<Map<String, Value>, AttemptError> {
        let text = self.backend.complete(request).await?;
        Ok(extract_json_object(&text)?)
    }
}

/// Prefix the caller's system prompt with JSON-only rules and, when a schema
/// is given, its name and pretty-printed body.
pub(crate) fn compose_system_prompt(system: &str, options: &StructuredOptions) -> String {
    match &options.schema {
        Some(schema) => {
            let adherence = if options.strict {
                "Strictly follow the schema."
            } else {
                "Follow the schema as a guideline."
            };
            let rendered =
                serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
            format!(
                "{JSON_RULES}\n{adherence}\nSchemaName: {}\nSchema:\n{rendered}\n\n{system}",
                options.schema_name
            )
        }
        None => format!("{JSON_RULES}\n\n{system}"),
    }
}
