//! Docfetch Core Library
//!
//! Delivers a single remote document to the user as a local download,
//! resiliently: the host's native save mechanism is tried first, and only if
//! that is rejected are the bytes fetched, checked against the expected file
//! format and saved through a transient local handle.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`retrieval`] - strategies, format verification and the retrieval state machine
//! - [`host`] - filesystem-backed host delivery
//! - [`filename`] - target file name sanitizing and collision-free paths

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod filename;
pub mod host;
pub mod retrieval;
#[cfg(test)]
pub mod test_support;

// Re-export commonly used types
pub use host::{DEFAULT_MAX_HANDLES, FilesystemHost};
pub use retrieval::{
    DownloadRequest, ErrorKind, FetchPolicy, FormatSignature, HostDelivery, HostError,
    LocalHandle, Retrieval, RetrievalError, RetrievalState, Retriever, RetryPolicy,
    VerifiedFetch,
};
