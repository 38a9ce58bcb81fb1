//! Scratch directories and synthetic volume payloads.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::TempDir;

const NIFTI1_SIZEOF_HDR: i32 = 348;
const NIFTI1_VOX_OFFSET: usize = 352;
const NIFTI2_SIZEOF_HDR: i32 = 540;
const NIFTI2_VOX_OFFSET: usize = 544;

/// Minimal single-file NIfTI-1 payload followed by `voxels` data bytes.
#[must_use]
pub fn nifti1_bytes(voxels: usize, big_endian: bool) -> Vec<u8> {
    let mut bytes = vec![0_u8; NIFTI1_VOX_OFFSET + voxels];
    let encoded = if big_endian {
        NIFTI1_SIZEOF_HDR.to_be_bytes()
    } else {
        NIFTI1_SIZEOF_HDR.to_le_bytes()
    };
    bytes[..4].copy_from_slice(&encoded);
    bytes[344..348].copy_from_slice(b"n+1\0");
    fill_voxels(&mut bytes[NIFTI1_VOX_OFFSET..]);
    bytes
}

/// Minimal single-file NIfTI-2 payload (little-endian) followed by `voxels` data bytes.
#[must_use]
pub fn nifti2_bytes(voxels: usize) -> Vec<u8> {
    let mut bytes = vec![0_u8; NIFTI2_VOX_OFFSET + voxels];
    bytes[..4].copy_from_slice(&NIFTI2_SIZEOF_HDR.to_le_bytes());
    bytes[4..12].copy_from_slice(b"n+2\0\r\n\x1a\n");
    fill_voxels(&mut bytes[NIFTI2_VOX_OFFSET..]);
    bytes
}

fn fill_voxels(voxels: &mut [u8]) {
    for (idx, byte) in voxels.iter_mut().enumerate() {
        *byte = u8::try_from(idx % 251).unwrap_or_default();
    }
}

/// Scratch directory with a recognisable prefix.
///
/// # Errors
///
/// Returns an error if the temporary directory cannot be created.
pub fn scratch_dir(prefix: &str) -> Result<TempDir> {
    Ok(tempfile::Builder::new().prefix(prefix).tempdir()?)
}

/// Write each `(name, contents)` pair as a file directly under `root`.
///
/// # Errors
///
/// Returns an error if any file cannot be written.
pub fn write_files(root: &Path, files: &[(&str, &[u8])]) -> Result<()> {
    fs::create_dir_all(root)?;
    for (name, contents) in files {
        fs::write(root.join(name), contents)?;
    }
    Ok(())
}

/// Layout of a scratch batch job: a populated source folder plus paths for the
/// destination and signal file (neither created).
pub struct BatchTree {
    /// Owning temp directory; dropping it removes the tree.
    pub root: TempDir,
    /// Populated source folder.
    pub source: PathBuf,
    /// Destination folder path.
    pub dest: PathBuf,
    /// Signal file path.
    pub signal: PathBuf,
}

/// Source folder containing `subj01_scan.nii`, `subj01_mesh.vtk`, and `notes.txt`.
///
/// # Errors
///
/// Returns an error if the scratch tree cannot be created.
pub fn sample_batch_tree() -> Result<BatchTree> {
    let tree = empty_batch_tree()?;
    let volume = nifti1_bytes(64, false);
    write_files(
        &tree.source,
        &[
            ("subj01_scan.nii", volume.as_slice()),
            ("subj01_mesh.vtk", b"# vtk DataFile Version 3.0\nmesh\n"),
            ("notes.txt", b"not an image"),
        ],
    )?;
    Ok(tree)
}

/// Empty source folder plus destination and signal paths.
///
/// # Errors
///
/// Returns an error if the scratch tree cannot be created.
pub fn empty_batch_tree() -> Result<BatchTree> {
    let root = scratch_dir("scanbatch-")?;
    let source = root.path().join("input");
    fs::create_dir_all(&source)?;
    Ok(BatchTree {
        dest: root.path().join("output"),
        signal: root.path().join("progress.txt"),
        source,
        root,
    })
}

/// Sorted base names of the entries directly under `dir`.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn sorted_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = fs::read_dir(dir)?
        .map(|entry| entry.map(|entry| entry.file_name().to_string_lossy().into_owned()))
        .collect::<std::io::Result<Vec<_>>>()?;
    names.sort();
    Ok(names)
}
