//! Error types for the job tracker.

use std::time::Duration;

use crate::pipeline::RunReport;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Local ledger database errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Email source errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to connect to {host}: {reason}")]
    ConnectFailed { host: String, reason: String },

    #[error("Authentication failed for mailbox {username}")]
    AuthFailed { username: String },

    #[error("Mailbox command failed: {0}")]
    Protocol(String),

    #[error("Email fetch task failed: {0}")]
    Task(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} returned server error {status}")]
    ServerError { provider: String, status: u16 },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::ServerError { .. })
    }
}

/// Extraction adapter failures. Only `is_fatal` ones stop a run.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Malformed extraction response: {0}")]
    Malformed(String),

    #[error("Extraction response cut off at the output limit ({output_tokens} tokens)")]
    Truncated { output_tokens: u32 },
}

impl ExtractionError {
    /// Every later email would fail the same way, so the batch should stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Llm(LlmError::AuthFailed { .. }))
    }
}

/// Tracking store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store read failed: {0}")]
    Read(String),

    #[error("Store write failed for {target}: {reason}")]
    Write { target: String, reason: String },

    #[error("Store returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Malformed store response: {0}")]
    Malformed(String),
}

/// Run-level failures. Anything here aborts the batch.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Snapshot read failed: {0}")]
    Snapshot(#[source] StoreError),

    #[error("Email fetch failed: {0}")]
    EmailFetch(#[source] ChannelError),

    /// The ledger failed mid-run. `partial` holds what was already done,
    /// including store writes made before the failure.
    #[error("Run interrupted after {} email(s): ledger error: {source}", .partial.total())]
    Interrupted {
        #[source]
        source: DatabaseError,
        partial: Box<RunReport>,
    },
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
