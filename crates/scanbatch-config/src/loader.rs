//! Settings file loading with environment overrides.
//!
//! # Design
//! - A missing settings file means defaults; a present but malformed file is an error.
//! - Environment overrides apply after the file so operators can adjust a shared config.
//! - Override lookup is injectable so tests never mutate the process environment.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::model::{DispatchSettings, LauncherSettings};

/// Overrides `env_name`.
pub const ENV_NAME_VAR: &str = "SCANBATCH_ENV_NAME";
/// Overrides `conda_executable`.
pub const CONDA_VAR: &str = "SCANBATCH_CONDA";
/// Switches the launcher to WSL for the given user.
pub const WSL_USER_VAR: &str = "SCANBATCH_WSL_USER";
/// Overrides `poll_interval_ms`.
pub const POLL_INTERVAL_VAR: &str = "SCANBATCH_POLL_INTERVAL_MS";

/// Load settings from `path` (if given) and the process environment.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed, an override is
/// malformed, or the merged settings fail validation.
pub fn load_settings(path: Option<&Path>) -> ConfigResult<DispatchSettings> {
    load_settings_with(path, |name| std::env::var(name).ok())
}

/// Load settings using a caller-supplied environment lookup.
///
/// # Errors
///
/// See [`load_settings`].
pub fn load_settings_with<F>(path: Option<&Path>, lookup: F) -> ConfigResult<DispatchSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = match path {
        Some(path) => read_settings_file(path)?,
        None => DispatchSettings::default(),
    };
    apply_env_overrides(&mut settings, lookup)?;
    settings.validate()?;
    Ok(settings)
}

fn read_settings_file(path: &Path) -> ConfigResult<DispatchSettings> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "settings file not found; using defaults");
            return Ok(DispatchSettings::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let settings = serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "loaded settings file");
    Ok(settings)
}

fn apply_env_overrides<F>(settings: &mut DispatchSettings, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(name) = non_blank(lookup(ENV_NAME_VAR)) {
        settings.env_name = name;
    }
    if let Some(conda) = non_blank(lookup(CONDA_VAR)) {
        settings.conda_executable = conda;
    }
    if let Some(user) = non_blank(lookup(WSL_USER_VAR)) {
        settings.launcher = LauncherSettings::Wsl { user };
    }
    if let Some(raw) = lookup(POLL_INTERVAL_VAR) {
        settings.poll_interval_ms = raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|value| *value > 0)
            .ok_or(ConfigError::InvalidEnv {
                name: POLL_INTERVAL_VAR,
                value: raw,
            })?;
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
