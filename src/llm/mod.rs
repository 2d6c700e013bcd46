//! LLM integration.
//!
//! Supports:
//! - **Gemini**: `generateContent` over HTTP (default)
//! - **Anthropic**: Messages API over HTTP
//!
//! Every provider is wrapped in a `RetryProvider` so transient 429/5xx
//! responses are retried with jittered backoff.

pub mod anthropic;
pub(crate) mod costs;
pub mod gemini;
pub mod provider;
pub mod retry;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use provider::*;
pub use retry::{RetryPolicy, RetryProvider};

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::config::{env_opt, env_parse};
use crate::error::{ConfigError, LlmError};

/// Default request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Gemini,
    Anthropic,
}

impl LlmBackend {
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini-2.5-flash",
            Self::Anthropic => "claude-sonnet-4-20250514",
        }
    }

    fn key_var(&self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl std::str::FromStr for LlmBackend {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            other => Err(ConfigError::InvalidValue {
                key: "LLM_BACKEND".into(),
                message: format!("unsupported backend '{other}'"),
            }),
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: SecretString,
    pub model: String,
    /// Endpoint override (proxies, tests).
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl LlmConfig {
    /// Build from `LLM_BACKEND`, `<BACKEND>_API_KEY`, `LLM_MODEL`,
    /// `LLM_BASE_URL`, `LLM_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend: LlmBackend = env_opt("LLM_BACKEND")
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or(LlmBackend::Gemini);

        let api_key = env_opt(backend.key_var())
            .ok_or_else(|| ConfigError::MissingEnvVar(backend.key_var().to_string()))?;

        Ok(Self {
            backend,
            api_key: SecretString::from(api_key),
            model: env_opt("LLM_MODEL").unwrap_or_else(|| backend.default_model().to_string()),
            base_url: env_opt("LLM_BASE_URL"),
            timeout: Duration::from_secs(env_parse("LLM_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?),
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let inner: Arc<dyn LlmProvider> = match config.backend {
        LlmBackend::Gemini => Arc::new(GeminiProvider::new(
            config.api_key.clone(),
            &config.model,
            config.base_url.as_deref(),
            config.timeout,
        )?),
        LlmBackend::Anthropic => Arc::new(AnthropicProvider::new(
            config.api_key.clone(),
            &config.model,
            config.base_url.as_deref(),
            config.timeout,
        )?),
    };
    tracing::info!("Using {:?} (model: {})", config.backend, config.model);
    Ok(Arc::new(RetryProvider::new(inner, RetryPolicy::default())))
}
