//! Conda-backed environment manager.
//!
//! # Design
//! - Every call goes through a [`Launcher`], so the same code drives a native
//!   conda and one living inside WSL.
//! - Environment lookup uses `conda env list --json` and matches on the last
//!   path component of each listed prefix.

use std::path::PathBuf;

use async_trait::async_trait;
use scanbatch_config::DispatchSettings;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::environment::{CommandOutput, EnvironmentManager, HostReport};
use crate::error::{EnvironmentError, EnvironmentResult};
use crate::launcher::{Launcher, decode_output};

const INTERPRETER_PROBE: &str = "import sys; print(sys.executable)";

#[derive(Debug, Deserialize)]
struct EnvList {
    envs: Vec<String>,
}

/// Names of the environments listed in `conda env list --json` output.
///
/// # Errors
///
/// Returns [`EnvironmentError::Parse`] when the output is not the expected JSON.
pub fn parse_env_list(json: &str) -> EnvironmentResult<Vec<String>> {
    let list: EnvList = serde_json::from_str(json).map_err(|err| EnvironmentError::Parse {
        operation: "env_list",
        detail: err.to_string(),
    })?;
    Ok(list
        .envs
        .iter()
        .filter_map(|prefix| {
            prefix
                .trim_end_matches(['/', '\\'])
                .rsplit(['/', '\\'])
                .next()
                .filter(|name| !name.is_empty())
                .map(str::to_string)
        })
        .collect())
}

/// [`EnvironmentManager`] that shells out to conda.
#[derive(Debug, Clone)]
pub struct CondaEnvironmentManager {
    conda: String,
    launcher: Launcher,
    required_system_packages: Vec<String>,
}

impl CondaEnvironmentManager {
    /// Manager configured from dispatch settings.
    #[must_use]
    pub fn from_settings(settings: &DispatchSettings) -> Self {
        Self {
            conda: settings.conda_executable.clone(),
            launcher: Launcher::from(&settings.launcher),
            required_system_packages: settings.required_system_packages.clone(),
        }
    }

    fn conda_argv<I, S>(&self, args: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        std::iter::once(self.conda.clone())
            .chain(args.into_iter().map(Into::into))
            .collect()
    }

    /// Run `argv` through the launcher and capture its output.
    async fn capture(&self, argv: &[String]) -> EnvironmentResult<CommandOutput> {
        let program = argv.first().cloned().unwrap_or_default();
        let mut command = self
            .launcher
            .command(argv)
            .ok_or_else(|| EnvironmentError::Parse {
                operation: "build_command",
                detail: "empty command".to_string(),
            })?;
        debug!(argv = ?self.launcher.wrap(argv), "running environment command");
        let output = command
            .output()
            .await
            .map_err(|source| EnvironmentError::Spawn { program, source })?;
        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: decode_output(&output.stdout),
            stderr: decode_output(&output.stderr),
        })
    }

    /// Like [`Self::capture`] but a non-zero exit is an error.
    async fn checked(&self, argv: &[String]) -> EnvironmentResult<CommandOutput> {
        let output = self.capture(argv).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(EnvironmentError::CommandFailed {
                program: argv.first().cloned().unwrap_or_default(),
                exit_code: output.exit_code,
                stderr: output.stderr,
            })
        }
    }

    /// Required system packages absent from the listing printed by `lister`.
    /// A listing that cannot be produced is an error, not an empty listing.
    async fn missing_packages(&self, lister: &[String]) -> EnvironmentResult<Vec<String>> {
        if self.required_system_packages.is_empty() {
            return Ok(Vec::new());
        }
        let listing = self.checked(lister).await?.stdout;
        Ok(self
            .required_system_packages
            .iter()
            .filter(|package| !listing.contains(package.as_str()))
            .cloned()
            .collect())
    }

    async fn answers(&self, argv: &[String]) -> bool {
        match self.capture(argv).await {
            Ok(output) => output.success(),
            Err(err) => {
                debug!(error = %err, detail = %err.detail(), "host check command failed");
                false
            }
        }
    }
}

#[async_trait]
impl EnvironmentManager for CondaEnvironmentManager {
    async fn exists(&self, name: &str) -> EnvironmentResult<bool> {
        let output = self.checked(&self.conda_argv(["env", "list", "--json"])).await?;
        Ok(parse_env_list(&output.stdout)?.iter().any(|env| env == name))
    }

    #[instrument(skip(self))]
    async fn create(&self, name: &str, python_version: &str) -> EnvironmentResult<()> {
        let argv = self.conda_argv([
            "create".to_string(),
            "-y".to_string(),
            "-n".to_string(),
            name.to_string(),
            format!("python={python_version}"),
            "pip".to_string(),
        ]);
        self.checked(&argv).await.map(|_| ())
    }

    #[instrument(skip(self))]
    async fn install_packages(&self, name: &str, packages: &[String]) -> EnvironmentResult<()> {
        let mut argv = self.conda_argv(["run", "-n", name, "pip", "install"]);
        argv.extend(packages.iter().cloned());
        self.checked(&argv).await.map(|_| ())
    }

    async fn run_command(&self, name: &str, argv: &[String]) -> EnvironmentResult<CommandOutput> {
        let mut full = self.conda_argv(["run", "-n", name]);
        full.extend(argv.iter().cloned());
        self.capture(&full).await
    }

    #[instrument(skip(self, value))]
    async fn set_path_variable(&self, name: &str, key: &str, value: &str) -> EnvironmentResult<()> {
        let argv = self.conda_argv([
            "env".to_string(),
            "config".to_string(),
            "vars".to_string(),
            "set".to_string(),
            "-n".to_string(),
            name.to_string(),
            format!("{key}={value}"),
        ]);
        self.checked(&argv).await.map(|_| ())
    }

    async fn resolve_interpreter_path(&self, name: &str) -> EnvironmentResult<PathBuf> {
        let argv = self.conda_argv(["run", "-n", name, "python", "-c", INTERPRETER_PROBE]);
        let output = self.checked(&argv).await?;
        let path = output.stdout.trim();
        if path.is_empty() {
            return Err(EnvironmentError::Parse {
                operation: "resolve_interpreter_path",
                detail: "interpreter path was empty".to_string(),
            });
        }
        Ok(PathBuf::from(path))
    }

    async fn check_host(&self) -> EnvironmentResult<HostReport> {
        let launcher_available = match &self.launcher {
            Launcher::Direct => true,
            Launcher::Wsl { .. } => {
                answers_directly(&["wsl".to_string(), "--status".to_string()]).await
            }
        };
        if !launcher_available {
            return Ok(HostReport {
                launcher_available,
                missing_packages: Vec::new(),
                manager_available: false,
            });
        }

        let missing_packages = self.missing_packages(&package_listing_argv()).await?;
        let manager_available = self.answers(&self.conda_argv(["--version"])).await;
        Ok(HostReport {
            launcher_available,
            missing_packages,
            manager_available,
        })
    }
}

fn package_listing_argv() -> Vec<String> {
    vec!["dpkg".to_string(), "-l".to_string()]
}

/// Run `argv` on the host itself, bypassing the launcher.
async fn answers_directly(argv: &[String]) -> bool {
    let Some(mut command) = Launcher::Direct.command(argv) else {
        return false;
    };
    match command.output().await {
        Ok(output) => output.status.success(),
        Err(err) => {
            debug!(error = %err, "launcher availability check failed");
            false
        }
    }
}
