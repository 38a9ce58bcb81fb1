#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, unreachable_pub, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Job parameters and dispatch settings for scanbatch.
//!
//! # Design
//! - `JobParameters` is the single input to a batch run, whether local or remote.
//! - `DispatchSettings` describes the managed environment and is loaded from JSON
//!   with environment overrides.

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    CONDA_VAR, ENV_NAME_VAR, POLL_INTERVAL_VAR, WSL_USER_VAR, load_settings, load_settings_with,
};
pub use model::{DispatchSettings, JobParameters, LauncherSettings};
