#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, unreachable_pub, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Job dispatch for scanbatch.
//!
//! Runs either execute in-process on a blocking worker thread or as a worker
//! subprocess inside a managed environment. The environment is driven through
//! a readiness state machine (host check, existence, optional bootstrap,
//! requirements probe with one search-path remediation) before any remote
//! worker starts. Progress is observed through bus events or the signal file.

pub mod conda;
pub mod dispatcher;
pub mod environment;
pub mod error;
pub mod job;
pub mod launcher;
pub mod monitor;
pub mod paths;
pub mod state;
#[cfg(test)]
mod testing;

pub use conda::{CondaEnvironmentManager, parse_env_list};
pub use dispatcher::{JobDispatcher, worker_argv};
pub use environment::{CommandOutput, EnvironmentManager, HostReport};
pub use error::{DispatchError, DispatchResult, EnvironmentError, EnvironmentResult};
pub use job::{BootstrapDecision, DispatchMode, FixedDecision, JobHandle, JobResult};
pub use launcher::{Launcher, decode_output, shell_join};
pub use monitor::{JobMonitor, ProgressSnapshot, SignalWatcher, TickSource};
pub use paths::{PathTranslator, to_environment_path};
pub use state::{EnvironmentReadiness, ReadinessState};
