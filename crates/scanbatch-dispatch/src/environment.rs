//! Environment manager capability.
//!
//! # Design
//! - The dispatcher only talks to the environment through this trait, so the
//!   readiness state machine can be exercised against a scripted double.
//! - `run_command` reports non-zero exits as data; the other operations treat
//!   them as failures.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::EnvironmentResult;

/// Captured result of a command run inside an environment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// Outcome of the host prerequisite checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostReport {
    /// The compatibility layer answered.
    pub launcher_available: bool,
    /// Required system packages that were not found.
    pub missing_packages: Vec<String>,
    /// The environment manager answered.
    pub manager_available: bool,
}

impl HostReport {
    /// Report for a host with nothing to check.
    #[must_use]
    pub const fn ready() -> Self {
        Self {
            launcher_available: true,
            missing_packages: Vec::new(),
            manager_available: true,
        }
    }

    /// Whether every prerequisite is satisfied.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.failure_reason().is_none()
    }

    /// First unmet prerequisite, phrased for the user.
    #[must_use]
    pub fn failure_reason(&self) -> Option<String> {
        if !self.launcher_available {
            return Some("compatibility layer is not available".to_string());
        }
        if !self.missing_packages.is_empty() {
            return Some(format!(
                "missing system packages: {}",
                self.missing_packages.join(", ")
            ));
        }
        if !self.manager_available {
            return Some("environment manager is not set up".to_string());
        }
        None
    }
}

/// Operations the dispatcher needs from an environment manager.
#[async_trait]
pub trait EnvironmentManager: Send + Sync {
    /// Whether an environment called `name` exists.
    async fn exists(&self, name: &str) -> EnvironmentResult<bool>;

    /// Create `name` with the pinned interpreter version.
    async fn create(&self, name: &str, python_version: &str) -> EnvironmentResult<()>;

    /// Install `packages` into `name`.
    async fn install_packages(&self, name: &str, packages: &[String]) -> EnvironmentResult<()>;

    /// Run `argv` inside `name`, capturing its output.
    async fn run_command(&self, name: &str, argv: &[String]) -> EnvironmentResult<CommandOutput>;

    /// Persist `key=value` in the environment's variables.
    async fn set_path_variable(&self, name: &str, key: &str, value: &str) -> EnvironmentResult<()>;

    /// Absolute path of the interpreter inside `name`.
    async fn resolve_interpreter_path(&self, name: &str) -> EnvironmentResult<PathBuf>;

    /// Check host prerequisites; the default reports nothing to check.
    async fn check_host(&self) -> EnvironmentResult<HostReport> {
        Ok(HostReport::ready())
    }
}
