//! Resilient retrieval of a single remote document as a local download.
//!
//! # Architecture
//!
//! - [`verify`] - format gate (declared content type, then leading bytes)
//! - [`DirectDelivery`] - asks the host to save the location natively
//! - [`VerifiedFetch`] - fetches, verifies and saves through a [`LocalHandle`]
//! - [`Retriever`] - tries direct delivery, falls back to the verified fetch,
//!   and publishes [`RetrievalState`] transitions
//!
//! Host save capabilities are injected through [`HostDelivery`], so the core
//! runs unchanged against the filesystem host or a test double.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use docfetch_core::host::FilesystemHost;
//! use docfetch_core::retrieval::{DownloadRequest, RetrievalState, Retriever};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let host = Arc::new(FilesystemHost::new("./downloads"));
//! let retriever = Retriever::new(host).with_origin("https://portfolio.example".parse()?);
//!
//! let retrieval = retriever.retrieve(DownloadRequest::pdf("/doc.pdf", "resume.pdf"));
//! match retrieval.finished().await {
//!     RetrievalState::Succeeded => println!("saved"),
//!     RetrievalState::Failed(kind) => println!("failed: {kind}"),
//!     _ => unreachable!("finished() returns a terminal state"),
//! }
//! # Ok(())
//! # }
//! ```

mod direct;
mod error;
mod fetch;
mod host;
mod orchestrator;
mod policy;
mod request;
mod state;
pub mod verify;

pub use direct::DirectDelivery;
pub use error::{ErrorKind, RetrievalError};
pub use fetch::{CONNECT_TIMEOUT_SECS, VerifiedFetch};
pub use host::{HandleGuard, HostDelivery, HostError, LocalHandle};
pub use orchestrator::Retriever;
pub use policy::{FetchPolicy, RetryDecision, RetryPolicy, is_transient};
pub use request::{DownloadRequest, FormatSignature, PDF_MAGIC, PNG_MAGIC, ZIP_MAGIC};
pub use state::{Retrieval, RetrievalState, StateObserver, StateTracker};
