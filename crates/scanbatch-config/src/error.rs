//! Error types for configuration operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A job parameter or setting contained an invalid value.
    #[error("invalid configuration input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// Reading the settings file failed.
    #[error("failed to read settings file")]
    Io {
        /// Path of the settings file.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// The settings file was not valid JSON for the settings model.
    #[error("failed to parse settings file")]
    Json {
        /// Path of the settings file.
        path: PathBuf,
        /// Source serde error.
        source: serde_json::Error,
    },
    /// An environment override held a value that could not be applied.
    #[error("invalid environment override")]
    InvalidEnv {
        /// Name of the environment variable.
        name: &'static str,
        /// Value that was rejected.
        value: String,
    },
    /// The positional worker arguments were malformed.
    #[error("invalid worker arguments")]
    InvalidWorkerArgs {
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
}

impl ConfigError {
    /// Human-readable summary including the context fields.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::InvalidInput {
                field,
                reason,
                value,
            } => match value {
                Some(value) => format!("{field} {reason} (got '{value}')"),
                None => format!("{field} {reason}"),
            },
            Self::Io { path, source } => {
                format!("failed to read {}: {source}", path.display())
            }
            Self::Json { path, source } => {
                format!("failed to parse {}: {source}", path.display())
            }
            Self::InvalidEnv { name, value } => format!("{name} has invalid value '{value}'"),
            Self::InvalidWorkerArgs { reason } => format!("invalid worker arguments: {reason}"),
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: &'static str, value: Option<&str>) -> Self {
        Self::InvalidInput {
            field,
            reason,
            value: value.map(str::to_string),
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
