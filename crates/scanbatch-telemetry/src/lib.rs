#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, unreachable_pub, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Telemetry primitives shared across the scanbatch workspace.
//!
//! Installs the tracing subscriber, records the build identifier, and renders
//! the elapsed-time label progress reporters display.

pub mod context;
pub mod elapsed;
pub mod error;
pub mod init;

pub use context::{GlobalContextGuard, job_span};
pub use elapsed::format_elapsed;
pub use error::{Result, TelemetryError};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
