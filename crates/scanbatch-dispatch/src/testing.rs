//! Scripted environment manager shared by the dispatch tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use scanbatch_test_support::mocks::{CallLog, ScriptedReplies};

use crate::environment::{CommandOutput, EnvironmentManager, HostReport};
use crate::error::{EnvironmentError, EnvironmentResult};

/// Environment manager double. Commands are keyed by their first two argv
/// elements (`"scanbatch --version"`, `"scanbatch run"`); unscripted commands
/// succeed with empty output.
pub(crate) struct MockEnvironment {
    pub(crate) log: CallLog,
    exists: AtomicBool,
    host: HostReport,
    outputs: ScriptedReplies<CommandOutput>,
    failures: ScriptedReplies<String>,
    create_delay: Duration,
}

impl MockEnvironment {
    pub(crate) fn new() -> Self {
        Self {
            log: CallLog::default(),
            exists: AtomicBool::new(false),
            host: HostReport::ready(),
            outputs: ScriptedReplies::default(),
            failures: ScriptedReplies::default(),
            create_delay: Duration::ZERO,
        }
    }

    pub(crate) fn existing() -> Self {
        let mock = Self::new();
        mock.exists.store(true, Ordering::SeqCst);
        mock
    }

    pub(crate) fn with_host(mut self, host: HostReport) -> Self {
        self.host = host;
        self
    }

    pub(crate) fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    /// Queue an exit code for the command keyed by `key`.
    pub(crate) fn script_exit(&self, key: &str, exit_code: i32) {
        self.outputs.push(
            key,
            CommandOutput {
                exit_code: Some(exit_code),
                stdout: String::new(),
                stderr: if exit_code == 0 {
                    String::new()
                } else {
                    format!("error: {key} exited with {exit_code}")
                },
            },
        );
    }

    /// Make `operation` fail with `stderr`.
    pub(crate) fn fail(&self, operation: &str, stderr: &str) {
        self.failures.push(operation, stderr.to_string());
    }

    fn scripted_failure(&self, operation: &str) -> EnvironmentResult<()> {
        match self.failures.next(operation) {
            Some(stderr) => Err(EnvironmentError::CommandFailed {
                program: "conda".into(),
                exit_code: Some(1),
                stderr,
            }),
            None => Ok(()),
        }
    }
}

fn command_key(argv: &[String]) -> String {
    argv.iter().take(2).cloned().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl EnvironmentManager for MockEnvironment {
    async fn exists(&self, name: &str) -> EnvironmentResult<bool> {
        self.log.record(format!("exists {name}"));
        self.scripted_failure("exists")?;
        Ok(self.exists.load(Ordering::SeqCst))
    }

    async fn create(&self, name: &str, python_version: &str) -> EnvironmentResult<()> {
        self.log.record(format!("create {name} python={python_version}"));
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        self.scripted_failure("create")?;
        self.exists.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn install_packages(&self, name: &str, packages: &[String]) -> EnvironmentResult<()> {
        self.log
            .record(format!("install_packages {name} {}", packages.join(" ")));
        self.scripted_failure("install_packages")
    }

    async fn run_command(&self, name: &str, argv: &[String]) -> EnvironmentResult<CommandOutput> {
        self.log
            .record(format!("run_command {name} {}", argv.join(" ")));
        self.scripted_failure("run_command")?;
        Ok(self
            .outputs
            .next(&command_key(argv))
            .unwrap_or(CommandOutput {
                exit_code: Some(0),
                ..CommandOutput::default()
            }))
    }

    async fn set_path_variable(&self, name: &str, key: &str, value: &str) -> EnvironmentResult<()> {
        self.log
            .record(format!("set_path_variable {name} {key}={value}"));
        self.scripted_failure("set_path_variable")
    }

    async fn resolve_interpreter_path(&self, name: &str) -> EnvironmentResult<PathBuf> {
        self.log.record(format!("resolve_interpreter_path {name}"));
        self.scripted_failure("resolve_interpreter_path")?;
        Ok(PathBuf::from(format!("/opt/conda/envs/{name}/bin/python")))
    }

    async fn check_host(&self) -> EnvironmentResult<HostReport> {
        self.log.record("check_host");
        self.scripted_failure("check_host")?;
        Ok(self.host.clone())
    }
}
