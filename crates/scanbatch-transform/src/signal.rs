//! Progress signal file.
//!
//! The file's modification time is the progress channel: one strictly newer
//! mtime per processed entry. Contents are informational only.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use filetime::FileTime;
use tracing::debug;

use crate::error::{TransformError, TransformResult};

const MIN_TICK_NANOS: u32 = 1_000_000;

/// Single-writer handle on a signal file.
#[derive(Debug)]
pub struct SignalFile {
    path: PathBuf,
    last_mtime: FileTime,
}

impl SignalFile {
    /// Truncate (or create) the signal file. This is the run's progress reset.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::SignalFileUnwritable`] when the file cannot be
    /// created or truncated.
    pub fn reset(path: &Path) -> TransformResult<Self> {
        let previous = fs::metadata(path)
            .ok()
            .map(|meta| FileTime::from_last_modification_time(&meta));
        File::create(path).map_err(|source| TransformError::signal(path, source))?;
        let mut signal = Self {
            path: path.to_path_buf(),
            last_mtime: FileTime::zero(),
        };
        signal.last_mtime = signal.advance_mtime(previous)?;
        debug!(path = %path.display(), "signal file reset");
        Ok(signal)
    }

    /// Append `index` and a newline, guaranteeing a strictly newer mtime.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::SignalFileUnwritable`] when the append or the
    /// timestamp bump fails.
    pub fn append(&mut self, index: usize) -> TransformResult<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|source| TransformError::signal(&self.path, source))?;
        writeln!(file, "{index}").map_err(|source| TransformError::signal(&self.path, source))?;
        drop(file);
        self.last_mtime = self.advance_mtime(Some(self.last_mtime))?;
        Ok(())
    }

    /// Path of the signal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Modification time recorded after the latest write.
    #[must_use]
    pub const fn last_mtime(&self) -> FileTime {
        self.last_mtime
    }

    fn advance_mtime(&self, previous: Option<FileTime>) -> TransformResult<FileTime> {
        let current = fs::metadata(&self.path)
            .map(|meta| FileTime::from_last_modification_time(&meta))
            .map_err(|source| TransformError::signal(&self.path, source))?;
        let Some(previous) = previous else {
            return Ok(current);
        };
        if current > previous {
            return Ok(current);
        }
        let bumped = one_tick_after(previous);
        filetime::set_file_mtime(&self.path, bumped)
            .map_err(|source| TransformError::signal(&self.path, source))?;
        Ok(bumped)
    }
}

fn one_tick_after(time: FileTime) -> FileTime {
    let nanos = time.nanoseconds() + MIN_TICK_NANOS;
    if nanos >= 1_000_000_000 {
        FileTime::from_unix_time(time.unix_seconds() + 1, nanos - 1_000_000_000)
    } else {
        FileTime::from_unix_time(time.unix_seconds(), nanos)
    }
}

/// Read the current mtime of a signal file, if it exists.
///
/// # Errors
///
/// Returns any IO error other than the file being absent.
pub fn read_mtime(path: &Path) -> io::Result<Option<FileTime>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(FileTime::from_last_modification_time(&meta))),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}
