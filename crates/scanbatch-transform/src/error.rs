//! # Design
//!
//! - Provide structured, constant-message errors for the batch transform pipeline.
//! - Capture operation context (paths, fields, inputs) so failures name the entry involved.
//! - Preserve source errors without interpolating context into error messages.

use std::io;
use std::path::PathBuf;

use scanbatch_config::ConfigError;
use thiserror::Error;

/// Result type for batch transform operations.
pub type TransformResult<T> = Result<T, TransformError>;

/// Result type for image adapter operations.
pub type ImageResult<T> = Result<T, ImageError>;

/// Errors produced by the batch transformer.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Job parameters failed validation; raised before any I/O.
    #[error("transform invalid input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// IO failure while copying, listing, or renaming an entry.
    #[error("transform io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The signal file could not be truncated or appended to.
    #[error("signal file unwritable")]
    SignalFileUnwritable {
        /// Signal file path.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The image adapter failed to read or write a volume.
    #[error("transform image failure")]
    Image {
        /// Operation that triggered the image failure.
        operation: &'static str,
        /// Path involved in the image failure.
        path: PathBuf,
        /// Underlying adapter error.
        source: ImageError,
    },
}

impl TransformError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

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
            Self::Io {
                operation,
                path,
                source,
            } => format!("{operation} failed for {}: {source}", path.display()),
            Self::SignalFileUnwritable { path, source } => {
                format!("signal file {} is unwritable: {source}", path.display())
            }
            Self::Image {
                operation,
                path,
                source,
            } => format!("{operation} failed for {}: {}", path.display(), source.detail()),
        }
    }

    pub(crate) fn walkdir(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: walkdir::Error,
    ) -> Self {
        let source = source
            .into_io_error()
            .unwrap_or_else(|| io::Error::other("directory listing loop detected"));
        Self::io(operation, path, source)
    }

    pub(crate) fn signal(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::SignalFileUnwritable {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn image(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: ImageError,
    ) -> Self {
        Self::Image {
            operation,
            path: path.into(),
            source,
        }
    }
}

impl From<ConfigError> for TransformError {
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

/// Errors produced by image adapters.
#[derive(Debug, Error)]
pub enum ImageError {
    /// Reading or writing the volume file failed.
    #[error("image io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The payload is shorter than the header it claims to carry.
    #[error("image payload too short")]
    TooShort {
        /// Path of the volume.
        path: PathBuf,
        /// Observed payload length.
        len: usize,
        /// Minimum length required.
        required: usize,
    },
    /// The header did not match a supported layout.
    #[error("image header not recognised")]
    BadHeader {
        /// Path of the volume.
        path: PathBuf,
        /// Static reason for the rejection.
        reason: &'static str,
    },
    /// The file name does not map to a format the adapter can handle.
    #[error("unsupported image extension")]
    UnsupportedExtension {
        /// Path whose extension was rejected.
        path: PathBuf,
    },
}

impl ImageError {
    /// Human-readable summary including the context fields.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Io { operation, source, .. } => format!("{operation}: {source}"),
            Self::TooShort { len, required, .. } => {
                format!("payload is {len} bytes, header needs {required}")
            }
            Self::BadHeader { reason, .. } => (*reason).to_string(),
            Self::UnsupportedExtension { path } => {
                format!("no image format for {}", path.display())
            }
        }
    }

    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
