//! # Design
//!
//! - Constant-message errors with context fields, mirroring the transform crate.
//! - `EnvironmentError::detail` renders the context for user-facing failure text.

use std::io;

use scanbatch_config::ConfigError;
use scanbatch_transform::TransformError;
use thiserror::Error;
use tokio::task::JoinError;

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result type for environment manager operations.
pub type EnvironmentResult<T> = Result<T, EnvironmentError>;

/// Errors produced while dispatching a batch run.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Job parameters failed validation before dispatch.
    #[error("dispatch invalid input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// Host prerequisites or the requirements probe failed.
    #[error("execution environment not ready")]
    EnvironmentUnready {
        /// Environment name.
        env_name: String,
        /// Why the environment is unusable.
        reason: String,
    },
    /// The caller declined to bootstrap a missing environment.
    #[error("environment bootstrap declined")]
    EnvironmentDeclined {
        /// Environment name.
        env_name: String,
    },
    /// A bootstrap stage failed; the partial environment is left in place.
    #[error("environment bootstrap failed")]
    BootstrapFailed {
        /// Environment name.
        env_name: String,
        /// Stage that failed (`create`, `install_packages`, `verify`).
        stage: &'static str,
        /// Failure detail from the environment manager.
        detail: String,
    },
    /// An environment manager call failed outside bootstrap.
    #[error("environment manager failure")]
    Environment {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Underlying environment error.
        source: EnvironmentError,
    },
    /// Listing the source directory failed at dispatch time.
    #[error("batch transform failure")]
    Transform {
        /// Underlying transform error.
        #[from]
        source: TransformError,
    },
    /// A background task panicked or was cancelled.
    #[error("background task failed")]
    Join {
        /// Underlying join error.
        source: JoinError,
    },
}

impl DispatchError {
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
            Self::EnvironmentUnready { env_name, reason } => {
                format!("environment '{env_name}' is not ready: {reason}")
            }
            Self::EnvironmentDeclined { env_name } => {
                format!("environment '{env_name}' does not exist and was not created")
            }
            Self::BootstrapFailed {
                env_name,
                stage,
                detail,
            } => format!("bootstrap of '{env_name}' failed at {stage}: {detail}"),
            Self::Environment { operation, source } => {
                format!("{operation} failed: {}", source.detail())
            }
            Self::Transform { source } => source.detail(),
            Self::Join { source } => format!("background task failed: {source}"),
        }
    }

    /// Whether the failure was caused by caller input rather than the run.
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput { .. }
                | Self::Transform {
                    source: TransformError::InvalidInput { .. }
                }
        )
    }
}

impl From<ConfigError> for DispatchError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::InvalidInput {
                field,
                reason,
                value,
            } => Self::InvalidInput {
                field,
                reason,
                value,
            },
            other => Self::InvalidInput {
                field: "parameters",
                reason: "rejected by configuration",
                value: Some(other.to_string()),
            },
        }
    }
}

/// Errors produced by environment manager implementations.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    /// The command could not be started.
    #[error("failed to spawn environment command")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The command ran but exited unsuccessfully.
    #[error("environment command failed")]
    CommandFailed {
        /// Program that was run.
        program: String,
        /// Exit code, when the process was not killed by a signal.
        exit_code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },
    /// Command output could not be interpreted.
    #[error("failed to parse environment output")]
    Parse {
        /// Operation whose output was rejected.
        operation: &'static str,
        /// What was wrong with the output.
        detail: String,
    },
}

impl EnvironmentError {
    /// Human-readable summary including the context fields.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Spawn { program, source } => format!("{program}: {source}"),
            Self::CommandFailed {
                program,
                exit_code,
                stderr,
            } => {
                let code = exit_code.map_or_else(|| "signal".to_string(), |code| code.to_string());
                format!("{program} exited with {code}: {}", stderr.trim())
            }
            Self::Parse { operation, detail } => format!("{operation}: {detail}"),
        }
    }
}
