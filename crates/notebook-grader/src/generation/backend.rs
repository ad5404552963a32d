use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::{ConfigError, GeneratorConfig};
use crate::errors::AttemptError;

/// One chat-completion call: a system and a user message plus sampling knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Anything that can answer a [`CompletionRequest`] with reply text.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Perform a single attempt. Retries are the caller's concern.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AttemptError>;

    /// Identifier for logs.
    fn name(&self) -> &str;
}

/// Backend for OpenAI-style `POST {base_url}/chat/completions` endpoints
/// (Groq, OpenAI, vLLM, llama.cpp server, ...).
pub struct OpenAiCompatibleBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatibleBackend {
    pub fn new(config: &GeneratorConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl CompletionBackend for OpenAiCompatibleBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AttemptError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "temperature": request.temperature,
            "top_p": 1,
            "stream": false,
            "max_completion_tokens": request.max_tokens,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Status { status, body });
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| AttemptError::MalformedResponse(e.to_string()))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AttemptError::MalformedResponse("no choices in completion".into()))?;

        // Missing content is an empty reply; extraction reports it.
        Ok(choice
            .message
            .and_then(|m| m.content)
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    fn name(&self) -> &str {
        &self.model
    }
}
