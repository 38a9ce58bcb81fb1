//! Job parameters and dispatch settings.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{ConfigError, ConfigResult};
use crate::validate::{parse_overwrite_flag, validate_job, validate_settings};

/// Parameters for a single batch run. Treated as immutable once dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParameters {
    /// Folder whose entries are copied or converted.
    pub source_dir: PathBuf,
    /// Folder that receives the copies and is renamed in place.
    pub dest_dir: PathBuf,
    /// Substring searched for in destination entry names.
    pub find: String,
    /// Replacement for every occurrence of `find`.
    pub replace: String,
    /// Skip the copy pass and rename `dest_dir` in place.
    pub overwrite: bool,
    /// File whose modification time advances once per processed entry.
    pub signal_file: PathBuf,
}

impl JobParameters {
    /// Parameters for a copy-then-rename run into `dest_dir`.
    #[must_use]
    pub fn copy_into(
        source_dir: impl Into<PathBuf>,
        dest_dir: impl Into<PathBuf>,
        find: impl Into<String>,
        replace: impl Into<String>,
        signal_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            dest_dir: dest_dir.into(),
            find: find.into(),
            replace: replace.into(),
            overwrite: false,
            signal_file: signal_file.into(),
        }
    }

    /// Parameters for an in-place rename of `source_dir`; the destination is
    /// aliased to the source.
    #[must_use]
    pub fn for_overwrite(
        source_dir: impl Into<PathBuf>,
        find: impl Into<String>,
        replace: impl Into<String>,
        signal_file: impl Into<PathBuf>,
    ) -> Self {
        let source_dir = source_dir.into();
        Self {
            dest_dir: source_dir.clone(),
            source_dir,
            find: find.into(),
            replace: replace.into(),
            overwrite: true,
            signal_file: signal_file.into(),
        }
    }

    /// Check that every string field is non-empty and the source is a directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidInput`] naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        validate_job(self)
    }

    /// Render the positional worker invocation:
    /// `<source> <find> <replace> <dest> <True|False> <signal>`.
    #[must_use]
    pub fn to_worker_args(&self) -> Vec<String> {
        vec![
            path_arg(&self.source_dir),
            self.find.clone(),
            self.replace.clone(),
            path_arg(&self.dest_dir),
            if self.overwrite { "True" } else { "False" }.to_string(),
            path_arg(&self.signal_file),
        ]
    }

    /// Parse the positional worker invocation produced by [`Self::to_worker_args`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidWorkerArgs`] when the argument count is
    /// wrong and [`ConfigError::InvalidInput`] when the overwrite flag is not
    /// exactly `True` or `False`.
    pub fn from_worker_args<S: AsRef<str>>(args: &[S]) -> ConfigResult<Self> {
        let [source, find, replace, dest, overwrite, signal] = args else {
            return Err(ConfigError::InvalidWorkerArgs {
                reason: "expected six positional arguments",
            });
        };
        Ok(Self {
            source_dir: PathBuf::from(source.as_ref()),
            dest_dir: PathBuf::from(dest.as_ref()),
            find: find.as_ref().to_string(),
            replace: replace.as_ref().to_string(),
            overwrite: parse_overwrite_flag(overwrite.as_ref())?,
            signal_file: PathBuf::from(signal.as_ref()),
        })
    }

    /// Copy of the parameters with every path rewritten by `translate`.
    #[must_use]
    pub fn with_translated_paths(&self, translate: impl Fn(&Path) -> String) -> Self {
        Self {
            source_dir: PathBuf::from(translate(&self.source_dir)),
            dest_dir: PathBuf::from(translate(&self.dest_dir)),
            find: self.find.clone(),
            replace: self.replace.clone(),
            overwrite: self.overwrite,
            signal_file: PathBuf::from(translate(&self.signal_file)),
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// How commands reach the environment manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LauncherSettings {
    /// Run the environment manager directly on the host.
    #[default]
    Direct,
    /// Run it inside WSL as the given user.
    Wsl {
        /// Linux user commands run as.
        user: String,
    },
}

impl LauncherSettings {
    /// Whether host paths must be translated before crossing the boundary.
    #[must_use]
    pub const fn translates_paths(&self) -> bool {
        matches!(self, Self::Wsl { .. })
    }
}

/// Settings for the managed execution environment and worker invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Name of the managed environment.
    pub env_name: String,
    /// Interpreter version pinned at creation.
    pub python_version: String,
    /// Packages installed after creation.
    pub packages: Vec<String>,
    /// Environment manager executable.
    pub conda_executable: String,
    /// Compatibility layer used to reach the environment manager.
    pub launcher: LauncherSettings,
    /// Worker entry point; the six positional job arguments are appended.
    pub worker_command: Vec<String>,
    /// Requirements probe; success is judged by exit status.
    pub probe_command: Vec<String>,
    /// Variable injected when the first probe fails.
    pub search_path_key: String,
    /// Host paths joined into `search_path_key` during remediation.
    pub search_paths: Vec<String>,
    /// System packages that must be installed inside the launcher.
    pub required_system_packages: Vec<String>,
    /// Poll interval for progress and completion checks.
    pub poll_interval_ms: u64,
    /// Mount root for translated drive paths.
    pub mount_root: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            env_name: defaults::ENV_NAME.to_string(),
            python_version: defaults::PYTHON_VERSION.to_string(),
            packages: Vec::new(),
            conda_executable: defaults::CONDA_EXECUTABLE.to_string(),
            launcher: LauncherSettings::default(),
            worker_command: defaults::worker_command(),
            probe_command: defaults::probe_command(),
            search_path_key: defaults::SEARCH_PATH_KEY.to_string(),
            search_paths: Vec::new(),
            required_system_packages: Vec::new(),
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            mount_root: defaults::MOUNT_ROOT.to_string(),
        }
    }
}

impl DispatchSettings {
    /// Check the settings for values the dispatcher cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidInput`] naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        validate_settings(self)
    }

    /// Poll interval as a [`std::time::Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_args_round_trip() -> anyhow::Result<()> {
        let params = JobParameters::copy_into("/in", "/out", "subj", "anon", "/tmp/sig");
        let args = params.to_worker_args();
        assert_eq!(args, ["/in", "subj", "anon", "/out", "False", "/tmp/sig"]);
        assert_eq!(JobParameters::from_worker_args(&args)?, params);

        let overwrite = JobParameters::for_overwrite("/in", "a", "b", "/tmp/sig");
        assert_eq!(overwrite.dest_dir, overwrite.source_dir);
        assert_eq!(
            JobParameters::from_worker_args(&overwrite.to_worker_args())?,
            overwrite
        );
        Ok(())
    }

    #[test]
    fn worker_args_reject_loose_boolean_spellings() {
        for flag in ["true", "1", "yes", "FALSE", ""] {
            let args = ["/in", "a", "b", "/out", flag, "/sig"];
            assert!(matches!(
                JobParameters::from_worker_args(&args),
                Err(ConfigError::InvalidInput {
                    field: "overwrite",
                    ..
                })
            ));
        }
    }

    #[test]
    fn worker_args_require_six_values() {
        let args = ["/in", "a", "b", "/out", "True"];
        assert!(matches!(
            JobParameters::from_worker_args(&args),
            Err(ConfigError::InvalidWorkerArgs { .. })
        ));
    }

    #[test]
    fn translated_paths_leave_strings_alone() {
        let params = JobParameters::copy_into("C:\\in", "C:\\out", "x", "y", "C:\\sig");
        let translated = params.with_translated_paths(|path| {
            format!("/mnt/{}", path.to_string_lossy().to_lowercase())
        });
        assert_eq!(translated.source_dir, PathBuf::from("/mnt/c:\\in"));
        assert_eq!(translated.find, "x");
        assert_eq!(translated.replace, "y");
        assert!(!translated.overwrite);
    }

    #[test]
    fn settings_defaults_and_partial_json() -> anyhow::Result<()> {
        let settings: DispatchSettings =
            serde_json::from_str(r#"{"env_name": "imaging", "launcher": {"kind": "wsl", "user": "lab"}}"#)?;
        assert_eq!(settings.env_name, "imaging");
        assert_eq!(settings.python_version, "3.9");
        assert_eq!(settings.poll_interval_ms, 300);
        assert_eq!(settings.worker_command, ["scanbatch", "run"]);
        assert!(settings.launcher.translates_paths());
        assert!(!DispatchSettings::default().launcher.translates_paths());
        Ok(())
    }
}
