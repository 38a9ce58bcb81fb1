//! Validation helpers for job parameters and dispatch settings.

use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{DispatchSettings, JobParameters, LauncherSettings};

pub(crate) fn validate_job(params: &JobParameters) -> ConfigResult<()> {
    require_path("source_dir", &params.source_dir)?;
    require_path("dest_dir", &params.dest_dir)?;
    require_text("find", &params.find)?;
    require_text("replace", &params.replace)?;
    require_path("signal_file", &params.signal_file)?;

    if !params.source_dir.is_dir() {
        return Err(ConfigError::invalid(
            "source_dir",
            "must be an existing directory",
            params.source_dir.to_str(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_settings(settings: &DispatchSettings) -> ConfigResult<()> {
    require_text("env_name", &settings.env_name)?;
    require_text("python_version", &settings.python_version)?;
    require_text("conda_executable", &settings.conda_executable)?;
    require_text("search_path_key", &settings.search_path_key)?;
    require_text("mount_root", &settings.mount_root)?;
    require_command("worker_command", &settings.worker_command)?;
    require_command("probe_command", &settings.probe_command)?;

    if settings.poll_interval_ms == 0 {
        return Err(ConfigError::invalid(
            "poll_interval_ms",
            "must be greater than zero",
            Some("0"),
        ));
    }
    if let LauncherSettings::Wsl { user } = &settings.launcher {
        require_text("launcher.user", user)?;
    }
    Ok(())
}

/// Accept exactly `True` or `False`; anything else is rejected.
pub(crate) fn parse_overwrite_flag(value: &str) -> ConfigResult<bool> {
    match value {
        "True" => Ok(true),
        "False" => Ok(false),
        other => Err(ConfigError::invalid(
            "overwrite",
            "must be True or False",
            Some(other),
        )),
    }
}

fn require_text(field: &'static str, value: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::invalid(field, "must not be empty", Some(value)));
    }
    Ok(())
}

fn require_path(field: &'static str, value: &Path) -> ConfigResult<()> {
    if value.as_os_str().to_string_lossy().trim().is_empty() {
        return Err(ConfigError::invalid(field, "must not be empty", None));
    }
    Ok(())
}

fn require_command(field: &'static str, command: &[String]) -> ConfigResult<()> {
    match command.first() {
        Some(program) if !program.trim().is_empty() => Ok(()),
        _ => Err(ConfigError::invalid(
            field,
            "must name a program to run",
            None,
        )),
    }
}
