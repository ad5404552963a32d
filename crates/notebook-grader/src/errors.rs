//! Generation error taxonomy.
//!
//! Two layers:
//!
//! - [`AttemptError`]: why one request attempt failed (transport, HTTP status,
//!   unusable payload, no JSON object). Every variant is retried.
//! - [`GenerationError`]: what the caller sees once retries are exhausted. Its
//!   message comes from the [`FailureCategory`] of the last attempt error, not
//!   from the low-level cause.
//!
//! ## Classification (case-insensitive substring, first match wins)
//!
//! | Category         | Matches                              |
//! |------------------|--------------------------------------|
//! | InvalidApiKey    | `invalid api key`, `invalid_api_key` |
//! | RateLimited      | `rate limit`, `429`                  |
//! | Timeout          | `timeout`                            |
//! | PermissionDenied | `permission`, `forbidden`            |
//! | Unknown          | anything else                        |

use std::fmt;

use grading::ExtractError;
use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single generation attempt.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// Connection-level failure (DNS, TLS, reset, body read).
    #[error("Request failed: {0}")]
    Transport(String),

    /// The per-request deadline elapsed.
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Non-2xx response from the generation service.
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// 2xx response whose payload is not a usable completion.
    #[error("Malformed completion payload: {0}")]
    MalformedResponse(String),

    /// The completion text contained no recoverable JSON object.
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl AttemptError {
    /// Short tag for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Timeout(_) => "timeout",
            Self::Status { .. } => "http_status",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Extract(_) => "extract",
        }
    }
}

impl From<reqwest::Error> for AttemptError {
    fn from(err: reqwest::Error) -> Self {
        // URLs carry ports and hosts that can trip the substring classifier.
        let err = err.without_url();
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Human-facing classification of an exhausted generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    InvalidApiKey,
    RateLimited,
    Timeout,
    PermissionDenied,
    Unknown,
}

impl FailureCategory {
    /// Classify an error message. Only selects the surfaced text; retry
    /// behavior never depends on it.
    pub fn classify(message: &str) -> Self {
        let msg = message.to_lowercase();

        if msg.contains("invalid api key") || msg.contains("invalid_api_key") {
            Self::InvalidApiKey
        } else if msg.contains("rate limit") || msg.contains("429") {
            Self::RateLimited
        } else if msg.contains("timeout") {
            Self::Timeout
        } else if msg.contains("permission") || msg.contains("forbidden") {
            Self::PermissionDenied
        } else {
            Self::Unknown
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            Self::InvalidApiKey => "Invalid API key. Check that the key is correct.",
            Self::RateLimited => {
                "Rate limit exceeded for the model API. Wait a moment or use another key."
            }
            Self::Timeout => "Timed out waiting for the model to respond. Please try again.",
            Self::PermissionDenied => {
                "No access to the model. Check the permissions of your API key."
            }
            Self::Unknown => "Could not get a response from the model. Check the key and try again.",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidApiKey => write!(f, "invalid_api_key"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Timeout => write!(f, "timeout"),
            Self::PermissionDenied => write!(f, "permission_denied"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Generation failed after every attempt. Displays only the categorized
/// user-facing message; the last attempt error is kept as the source.
#[derive(Debug, Error)]
#[error("{}", .category.user_message())]
pub struct GenerationError {
    pub category: FailureCategory,
    /// Attempts made before giving up.
    pub attempts: u32,
    #[source]
    pub last_error: AttemptError,
}

impl GenerationError {
    pub fn from_last_error(last_error: AttemptError, attempts: u32) -> Self {
        Self {
            category: FailureCategory::classify(&last_error.to_string()),
            attempts,
            last_error,
        }
    }
}
