//! Generation client configuration.
//!
//! Everything the client needs is carried by [`GeneratorConfig`] and handed to
//! the constructor; nothing is read from the environment after that. Env and
//! TOML loading exist for the CLI.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variables
//! 2. TOML config file (`--config`)
//! 3. Built-in defaults
//!
//! | Variable           | Field       | Default                          |
//! |--------------------|-------------|----------------------------------|
//! | `GROQ_API_KEY`     | api_key     | none (falls back to `LLM_API_KEY`) |
//! | `LLM_MODEL`        | model       | `llama-3.1-8b-instant`           |
//! | `LLM_BASE_URL`     | base_url    | `https://api.groq.com/openai/v1` |
//! | `LLM_DEBUG`        | debug       | `false`                          |
//! | `LLM_TIMEOUT_SECS` | timeout     | 60                               |

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

const ENV_API_KEY: &str = "GROQ_API_KEY";
const ENV_API_KEY_FALLBACK: &str = "LLM_API_KEY";
const ENV_MODEL: &str = "LLM_MODEL";
const ENV_BASE_URL: &str = "LLM_BASE_URL";
const ENV_DEBUG: &str = "LLM_DEBUG";
const ENV_TIMEOUT_SECS: &str = "LLM_TIMEOUT_SECS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing API key. Set GROQ_API_KEY or LLM_API_KEY.")]
    MissingApiKey,

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Retry schedule for generation requests.
///
/// Every failure is retried the same way; there is no per-category policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = retries + 1).
    pub retries: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub base_delay_ms: u64,
    /// Upper bound (exclusive) of the uniform jitter added to each delay.
    pub max_jitter_ms: u64,
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Deterministic part of the delay after the given 0-indexed attempt.
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    /// Full delay after the given 0-indexed attempt, with jitter drawn from
    /// `[0, max_jitter_ms)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let jitter_ms = rand::rng().random::<f64>() * self.max_jitter_ms as f64;
        self.base_backoff(attempt) + Duration::from_secs_f64(jitter_ms / 1000.0)
    }
}

impl Default for RetryPolicy {
    /// Default: 2 retries, 600ms base delay, up to 250ms jitter.
    fn default() -> Self {
        Self {
            retries: 2,
            base_delay_ms: 600,
            max_jitter_ms: 250,
        }
    }
}

/// Settings for one generation client.
#[derive(Clone)]
pub struct GeneratorConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Log every attempt and failure at `info`/`warn` instead of `debug`.
    pub debug: bool,
    /// Per-request transport timeout.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("debug", &self.debug)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl GeneratorConfig {
    /// Config with built-in defaults. The key is trimmed and must be non-empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ConfigError> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            debug: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load from the process environment only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(FileConfig::default(), |key| std::env::var(key).ok())
    }

    /// Load a TOML file, then apply environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file = FileConfig::from_toml_str(&content)?;
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Merge file values with variables from `lookup` (which win).
    ///
    /// `lookup` stands in for the environment so callers can build configs
    /// without touching process state.
    pub fn resolve(
        file: FileConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_empty(ENV_API_KEY)
            .or_else(|| non_empty(ENV_API_KEY_FALLBACK))
            .or(file.api_key)
            .unwrap_or_default();

        let mut config = Self::new(api_key)?;

        if let Some(base_url) = non_empty(ENV_BASE_URL).or(file.base_url) {
            config.base_url = base_url;
        }
        if let Some(model) = non_empty(ENV_MODEL).or(file.model) {
            config.model = model;
        }

        config.debug = match non_empty(ENV_DEBUG) {
            Some(value) => value.trim().eq_ignore_ascii_case("true"),
            None => file.debug.unwrap_or(false),
        };

        let timeout_secs = match non_empty(ENV_TIMEOUT_SECS) {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(secs) => secs,
                Err(_) => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_TIMEOUT_SECS,
                        value,
                    })
                }
            },
            None => file.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        };
        config.timeout = Duration::from_secs(timeout_secs);

        if let Some(retry) = file.retry {
            config.retry = retry;
        }

        Ok(config)
    }
}

/// On-disk configuration. Every field is optional.
///
/// ```toml
/// model = "llama-3.3-70b-versatile"
/// debug = true
/// timeout_secs = 90
///
/// [retry]
/// retries = 3
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub debug: Option<bool>,
    pub timeout_secs: Option<u64>,
    pub retry: Option<RetryPolicy>,
}

impl FileConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let err = GeneratorConfig::resolve(FileConfig::default(), env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey));

        let blank = GeneratorConfig::new("   ").unwrap_err();
        assert!(matches!(blank, ConfigError::MissingApiKey));
    }

    #[test]
    fn test_defaults() {
        let config =
            GeneratorConfig::resolve(FileConfig::default(), env(&[("GROQ_API_KEY", " gsk_1 ")]))
                .unwrap();
        assert_eq!(config.api_key, "gsk_1");
        assert_eq!(config.model, "llama-3.1-8b-instant");
        assert_eq!(config.base_url, "https://api.groq.com/openai/v1");
        assert!(!config.debug);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_primary_key_wins_over_fallback() {
        let config = GeneratorConfig::resolve(
            FileConfig::default(),
            env(&[("GROQ_API_KEY", "primary"), ("LLM_API_KEY", "fallback")]),
        )
        .unwrap();
        assert_eq!(config.api_key, "primary");

        let config =
            GeneratorConfig::resolve(FileConfig::default(), env(&[("LLM_API_KEY", "fallback")]))
                .unwrap();
        assert_eq!(config.api_key, "fallback");
    }

    #[test]
    fn test_debug_flag_is_case_insensitive() {
        for (raw, expected) in [("TRUE", true), ("true", true), ("1", false), ("no", false)] {
            let config = GeneratorConfig::resolve(
                FileConfig::default(),
                env(&[("LLM_API_KEY", "k"), ("LLM_DEBUG", raw)]),
            )
            .unwrap();
            assert_eq!(config.debug, expected, "LLM_DEBUG={raw}");
        }
    }

    #[test]
    fn test_env_overrides_file() {
        let file = FileConfig::from_toml_str(
            r#"
            api_key = "from-file"
            model = "file-model"
            debug = true
            timeout_secs = 5

            [retry]
            retries = 4
            "#,
        )
        .unwrap();

        let config =
            GeneratorConfig::resolve(file, env(&[("LLM_MODEL", "env-model")])).unwrap();
        assert_eq!(config.api_key, "from-file");
        assert_eq!(config.model, "env-model");
        assert!(config.debug);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.retry.retries, 4);
        assert_eq!(config.retry.base_delay_ms, 600);
    }

    #[test]
    fn test_invalid_timeout() {
        let err = GeneratorConfig::resolve(
            FileConfig::default(),
            env(&[("LLM_API_KEY", "k"), ("LLM_TIMEOUT_SECS", "soon")]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "LLM_TIMEOUT_SECS",
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_file_keys_rejected() {
        assert!(FileConfig::from_toml_str("temprature = 0.2").is_err());
    }

    #[test]
    fn test_debug_output_redacts_key() {
        let config = GeneratorConfig::new("gsk_secret").unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("gsk_secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.base_backoff(0), Duration::from_millis(600));
        assert_eq!(policy.base_backoff(1), Duration::from_millis(1200));
        assert_eq!(policy.base_backoff(2), Duration::from_millis(2400));

        for attempt in 0..3 {
            let delay = policy.backoff(attempt);
            assert!(delay >= policy.base_backoff(attempt));
            assert!(delay < policy.base_backoff(attempt) + Duration::from_millis(250));
        }
    }
}
