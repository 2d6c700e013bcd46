//! Configuration types.
//!
//! Everything comes from environment variables (optionally loaded from a
//! `.env` file by the binary). Each adapter owns its own `from_env()`;
//! this module holds the run-level knobs and the shared helpers.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::tracker::StatusPolicy;

/// Read a non-empty environment variable.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Read a required environment variable.
pub fn env_required(key: &str) -> Result<String, ConfigError> {
    env_opt(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Parse an environment variable, falling back to `default` when unset.
pub fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// A look-back window of `hours`, rejecting zero and values too large to
/// express in seconds.
pub fn window_from_hours(key: &str, hours: u64) -> Result<Duration, ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    };
    if hours == 0 {
        return Err(invalid("must be at least 1"));
    }
    hours
        .checked_mul(3600)
        .map(Duration::from_secs)
        .ok_or_else(|| invalid("window too large"))
}

/// Run-level configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// How far back to look for emails.
    pub window: Duration,
    /// Pause between emails, to stay under the store's rate limit.
    pub pace: Duration,
    /// Status transition policy.
    pub status_policy: StatusPolicy,
    /// Local ledger of processed emails.
    pub db_path: PathBuf,
    /// Directory for rolling log files (stderr only when unset).
    pub log_dir: Option<PathBuf>,
    /// Compute decisions without writing to the store.
    pub dry_run: bool,
    /// Process emails even if the ledger says they were handled.
    pub ignore_ledger: bool,
    /// Fold each applied decision into the in-memory snapshot.
    pub apply_in_run: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(24 * 3600),
            pace: Duration::from_secs(1),
            status_policy: StatusPolicy::Permissive,
            db_path: PathBuf::from("./data/job-tracker.db"),
            log_dir: None,
            dry_run: false,
            ignore_ledger: false,
            apply_in_run: false,
        }
    }
}

impl RunConfig {
    /// Build from `JOB_TRACKER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let window_hours: u64 = env_parse("JOB_TRACKER_WINDOW_HOURS", 24)?;
        let window = window_from_hours("JOB_TRACKER_WINDOW_HOURS", window_hours)?;
        let pace_ms: u64 = env_parse("JOB_TRACKER_PACE_MS", 1000)?;

        Ok(Self {
            window,
            pace: Duration::from_millis(pace_ms),
            status_policy: env_parse("JOB_TRACKER_STATUS_POLICY", StatusPolicy::Permissive)?,
            db_path: env_opt("JOB_TRACKER_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            log_dir: env_opt("JOB_TRACKER_LOG_DIR").map(PathBuf::from),
            ..defaults
        })
    }
}
