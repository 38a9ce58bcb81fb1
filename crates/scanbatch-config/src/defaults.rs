//! Default values for dispatch settings.
//!
//! # Design
//! - Keep every default in one place so serde defaults and `Default` agree.

/// Name of the managed execution environment.
pub(crate) const ENV_NAME: &str = "scanbatch";
/// Interpreter version pinned when the environment is created.
pub(crate) const PYTHON_VERSION: &str = "3.9";
/// Environment manager executable.
pub(crate) const CONDA_EXECUTABLE: &str = "conda";
/// Search-path variable injected during remediation.
pub(crate) const SEARCH_PATH_KEY: &str = "PYTHONPATH";
/// Poll interval for progress and completion checks.
pub(crate) const POLL_INTERVAL_MS: u64 = 300;
/// Root under which host drives are mounted inside the compatibility layer.
pub(crate) const MOUNT_ROOT: &str = "/mnt";

pub(crate) fn worker_command() -> Vec<String> {
    vec!["scanbatch".to_string(), "run".to_string()]
}

pub(crate) fn probe_command() -> Vec<String> {
    vec!["scanbatch".to_string(), "--version".to_string()]
}
