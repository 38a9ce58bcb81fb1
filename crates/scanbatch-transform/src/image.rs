//! Image I/O adapter used by the copy pass for volume entries.
//!
//! # Design
//! - The transformer only needs format passthrough: read a volume, write it back
//!   under a name whose suffix selects the encoding.
//! - `NiftiIo` validates the NIfTI-1/NIfTI-2 header and handles gzip through `flate2`.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{ImageError, ImageResult};

const NIFTI1_HEADER_LEN: usize = 348;
const NIFTI2_HEADER_LEN: usize = 540;
const NIFTI1_MAGIC_OFFSET: usize = 344;
const NIFTI2_MAGIC_OFFSET: usize = 4;

/// Reads and writes volume files, inferring the format from the file name.
pub trait ImageIo: Send + Sync {
    /// Load the volume at `path`.
    ///
    /// # Errors
    ///
    /// Returns an [`ImageError`] when the file cannot be read or decoded.
    fn read(&self, path: &Path) -> ImageResult<ImageHandle>;

    /// Write `image` to `path`, encoding according to the path's suffix.
    ///
    /// # Errors
    ///
    /// Returns an [`ImageError`] when the suffix is unsupported or the write fails.
    fn write(&self, image: &ImageHandle, path: &Path) -> ImageResult<()>;
}

/// NIfTI header revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NiftiVersion {
    /// 348-byte header, `n+1` magic.
    V1,
    /// 540-byte header, `n+2` magic.
    V2,
}

/// Decoded (uncompressed) volume payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    version: NiftiVersion,
    big_endian: bool,
    bytes: Vec<u8>,
}

impl ImageHandle {
    /// Header revision detected on read.
    #[must_use]
    pub const fn version(&self) -> NiftiVersion {
        self.version
    }

    /// Whether the header was stored big-endian.
    #[must_use]
    pub const fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    /// Uncompressed header and voxel bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Raw,
    Gzip,
}

fn encoding_for(path: &Path) -> ImageResult<Encoding> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.ends_with(".nii.gz") {
        Ok(Encoding::Gzip)
    } else if name.ends_with(".nii") {
        Ok(Encoding::Raw)
    } else {
        Err(ImageError::UnsupportedExtension {
            path: path.to_path_buf(),
        })
    }
}

/// Default adapter for `.nii` and `.nii.gz` volumes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NiftiIo;

impl NiftiIo {
    /// Inspect a decoded payload and build a handle for it.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::TooShort`] or [`ImageError::BadHeader`] when the
    /// payload is not a NIfTI volume.
    pub fn decode(path: &Path, bytes: Vec<u8>) -> ImageResult<ImageHandle> {
        let path_buf = || PathBuf::from(path);
        let Some(prefix) = bytes.get(..4) else {
            return Err(ImageError::TooShort {
                path: path_buf(),
                len: bytes.len(),
                required: NIFTI1_HEADER_LEN,
            });
        };
        let raw = [prefix[0], prefix[1], prefix[2], prefix[3]];
        let (size, big_endian) = match (i32::from_le_bytes(raw), i32::from_be_bytes(raw)) {
            (348 | 540, _) => (i32::from_le_bytes(raw), false),
            (_, 348 | 540) => (i32::from_be_bytes(raw), true),
            _ => {
                return Err(ImageError::BadHeader {
                    path: path_buf(),
                    reason: "sizeof_hdr is neither 348 nor 540",
                });
            }
        };
        let (version, header_len, magic_offset, magic) = if size == 348 {
            (NiftiVersion::V1, NIFTI1_HEADER_LEN, NIFTI1_MAGIC_OFFSET, b"n+1")
        } else {
            (NiftiVersion::V2, NIFTI2_HEADER_LEN, NIFTI2_MAGIC_OFFSET, b"n+2")
        };
        if bytes.len() < header_len {
            return Err(ImageError::TooShort {
                path: path_buf(),
                len: bytes.len(),
                required: header_len,
            });
        }
        if bytes.get(magic_offset..magic_offset + 3) != Some(magic.as_slice()) {
            return Err(ImageError::BadHeader {
                path: path_buf(),
                reason: "missing single-file magic",
            });
        }
        Ok(ImageHandle {
            version,
            big_endian,
            bytes,
        })
    }
}

impl ImageIo for NiftiIo {
    fn read(&self, path: &Path) -> ImageResult<ImageHandle> {
        let encoding = encoding_for(path)?;
        let raw = fs::read(path).map_err(|source| ImageError::io("nifti.read", path, source))?;
        let bytes = match encoding {
            Encoding::Raw => raw,
            Encoding::Gzip => {
                let mut decoded = Vec::new();
                GzDecoder::new(raw.as_slice())
                    .read_to_end(&mut decoded)
                    .map_err(|source| ImageError::io("nifti.gunzip", path, source))?;
                decoded
            }
        };
        Self::decode(path, bytes)
    }

    fn write(&self, image: &ImageHandle, path: &Path) -> ImageResult<()> {
        let payload = match encoding_for(path)? {
            Encoding::Raw => image.bytes.clone(),
            Encoding::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder
                    .write_all(&image.bytes)
                    .map_err(|source| ImageError::io("nifti.gzip", path, source))?;
                encoder
                    .finish()
                    .map_err(|source| ImageError::io("nifti.gzip", path, source))?
            }
        };
        fs::write(path, payload).map_err(|source| ImageError::io("nifti.write", path, source))
    }
}
