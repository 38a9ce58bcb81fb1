#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, unreachable_pub, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Batch folder transform: copy or convert medical images, then rename by
//! substring replacement.
//!
//! Layout: entry.rs (listing and classification), signal.rs (progress signal
//! file), image.rs (volume I/O adapter), service.rs (the pipeline).

pub mod entry;
pub mod error;
pub mod image;
pub mod service;
pub mod signal;

pub use entry::{
    DirectoryEntry, EntryKind, count_entries, extension_of, list_entries, replaced_name,
};
pub use error::{ImageError, ImageResult, TransformError, TransformResult};
pub use image::{ImageHandle, ImageIo, NiftiIo, NiftiVersion};
pub use service::{BatchTransformer, TransformSummary};
pub use signal::{SignalFile, read_mtime};
