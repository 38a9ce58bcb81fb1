#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, unreachable_pub, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Shared test helpers used across the scanbatch crates.
//! Layout: fixtures.rs (scratch trees, NIfTI payloads), mocks.rs (call logs and scripted replies).

pub mod fixtures;
pub mod mocks;
