//! Directory listing and extension classification.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{TransformError, TransformResult};

/// How the copy pass treats an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// `.nii` or `.nii.gz`; re-encoded through the image adapter.
    Volume,
    /// `.vtk`; copied byte for byte with metadata.
    Mesh,
    /// Anything else, including directories; skipped.
    Other,
}

impl EntryKind {
    /// Classify an extension as returned by [`extension_of`]. Case-sensitive.
    #[must_use]
    pub fn from_extension(extension: &str) -> Self {
        match extension {
            ".nii" | ".nii.gz" => Self::Volume,
            ".vtk" => Self::Mesh,
            _ => Self::Other,
        }
    }
}

/// Extension of a base name.
///
/// Names with more than one `.` take everything after the first dot, so
/// `a.nii.gz` yields `.nii.gz`. Otherwise the last-dot rule applies, where a
/// single leading dot (`.hidden`) is not an extension.
#[must_use]
pub fn extension_of(name: &str) -> String {
    if name.matches('.').count() > 1 {
        return name
            .find('.')
            .map_or_else(String::new, |idx| name[idx..].to_string());
    }
    match name.rfind('.') {
        Some(idx) if name[..idx].chars().any(|c| c != '.') => name[idx..].to_string(),
        _ => String::new(),
    }
}

/// Name with every occurrence of `find` replaced, or `None` when `find` does
/// not occur. Bytes outside the matches are kept as they are, so names that are
/// not valid UTF-8 survive the rename on Unix.
#[must_use]
pub fn replaced_name(name: &OsStr, find: &str, replace: &str) -> Option<OsString> {
    if find.is_empty() {
        return None;
    }
    if let Some(name) = name.to_str() {
        return name
            .contains(find)
            .then(|| OsString::from(name.replace(find, replace)));
    }
    replace_raw(name, find, replace)
}

#[cfg(unix)]
fn replace_raw(name: &OsStr, find: &str, replace: &str) -> Option<OsString> {
    use std::os::unix::ffi::{OsStrExt, OsStringExt};

    let bytes = name.as_bytes();
    let needle = find.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut rest = bytes;
    let mut matched = false;
    while let Some(idx) = rest.windows(needle.len()).position(|window| window == needle) {
        out.extend_from_slice(&rest[..idx]);
        out.extend_from_slice(replace.as_bytes());
        rest = &rest[idx + needle.len()..];
        matched = true;
    }
    out.extend_from_slice(rest);
    matched.then(|| OsString::from_vec(out))
}

#[cfg(not(unix))]
fn replace_raw(_name: &OsStr, _find: &str, _replace: &str) -> Option<OsString> {
    None
}

/// One entry of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Base name as stored on disk.
    pub file_name: OsString,
    /// Base name for display and logs; lossy when not valid UTF-8.
    pub name: String,
    /// Full path.
    pub path: PathBuf,
    /// Extension per [`extension_of`].
    pub extension: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

impl DirectoryEntry {
    /// Classification used by the copy pass. Directories are always `Other`.
    #[must_use]
    pub fn kind(&self) -> EntryKind {
        if self.is_dir {
            EntryKind::Other
        } else {
            EntryKind::from_extension(&self.extension)
        }
    }
}

/// List the immediate children of `dir` in filesystem order.
///
/// # Errors
///
/// Returns [`TransformError::Io`] when the directory cannot be read.
pub fn list_entries(dir: &Path, operation: &'static str) -> TransformResult<Vec<DirectoryEntry>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|source| TransformError::walkdir(operation, dir, source))?;
        let file_name = entry.file_name().to_os_string();
        let name = file_name.to_string_lossy().into_owned();
        entries.push(DirectoryEntry {
            file_name,
            extension: extension_of(&name),
            is_dir: entry.file_type().is_dir(),
            path: entry.into_path(),
            name,
        });
    }
    Ok(entries)
}

/// Number of immediate children of `dir`.
///
/// # Errors
///
/// Returns [`TransformError::Io`] when the directory cannot be read.
pub fn count_entries(dir: &Path) -> TransformResult<usize> {
    list_entries(dir, "count_entries.list").map(|entries| entries.len())
}
