//! Host-to-environment path translation.

use std::path::Path;

use scanbatch_config::{DispatchSettings, LauncherSettings};

/// Translate a host path for use inside the compatibility layer.
///
/// Backslashes become forward slashes, and a drive prefix (`C:`) becomes
/// `<mount_root>/c`. Paths without a drive are returned with only the
/// separator rewrite applied.
#[must_use]
pub fn to_environment_path(path: &str, mount_root: &str) -> String {
    let path = path.trim().replace('\\', "/");
    match path.split_once(':') {
        Some((drive, rest)) => format!(
            "{}/{}{}",
            mount_root.trim_end_matches('/'),
            drive.to_lowercase(),
            rest
        ),
        None => path,
    }
}

/// Path rewrite applied to job parameters and search paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathTranslator {
    /// Paths cross unchanged.
    Identity,
    /// Drive paths are rewritten under a mount root.
    Mount {
        /// Mount root, e.g. `/mnt`.
        mount_root: String,
    },
}

impl PathTranslator {
    /// Translator matching the configured launcher.
    #[must_use]
    pub fn from_settings(settings: &DispatchSettings) -> Self {
        match settings.launcher {
            LauncherSettings::Wsl { .. } => Self::Mount {
                mount_root: settings.mount_root.clone(),
            },
            LauncherSettings::Direct => Self::Identity,
        }
    }

    /// Translate a host path string.
    #[must_use]
    pub fn translate_str(&self, path: &str) -> String {
        match self {
            Self::Identity => path.to_string(),
            Self::Mount { mount_root } => to_environment_path(path, mount_root),
        }
    }

    /// Translate a host path.
    #[must_use]
    pub fn translate(&self, path: &Path) -> String {
        self.translate_str(&path.to_string_lossy())
    }

    /// Join translated `paths` with `:` for a search-path variable.
    #[must_use]
    pub fn search_path_value(&self, paths: &[String]) -> String {
        paths
            .iter()
            .map(|path| self.translate_str(path))
            .collect::<Vec<_>>()
            .join(":")
    }
}
