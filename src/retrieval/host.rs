//! Host delivery capabilities consumed by the retrieval strategies.
//!
//! The host owns the actual save mechanism: a native "save this location"
//! instruction for direct delivery, and transient [`LocalHandle`]s that make
//! an in-memory buffer addressable as a save target for the verified path.
//! Handles are a bounded host resource, so every handle handed out by
//! [`HostDelivery::materialize_handle`] must be returned through
//! [`HostDelivery::release`] exactly once. [`HandleGuard`] enforces that on
//! every exit path.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Errors raised by a host delivery implementation.
#[derive(Debug, Error)]
pub enum HostError {
    /// The host has no native mechanism for this kind of location.
    #[error("host cannot deliver {scheme} locations directly")]
    Unsupported {
        /// The rejected URL scheme.
        scheme: String,
    },

    /// All handle slots are in use.
    #[error("local handle limit reached ({limit} live handles)")]
    HandleLimit {
        /// Maximum number of live handles.
        limit: usize,
    },

    /// The handle is not (or no longer) registered with this host.
    #[error("unknown local handle {uri}")]
    UnknownHandle {
        /// The handle URI.
        uri: String,
    },

    /// The native delivery mechanism failed.
    #[error("delivery rejected: {reason}")]
    Rejected {
        /// Human-readable reason.
        reason: String,
    },

    /// File system error while saving.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl HostError {
    /// Creates an unsupported-scheme error.
    pub fn unsupported(scheme: impl Into<String>) -> Self {
        Self::Unsupported {
            scheme: scheme.into(),
        }
    }

    /// Creates a rejection error.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A transient, process-local reference to a materialized byte buffer.
///
/// Neither `Clone` nor `Copy`: the only way to give a handle
/// back is [`HostDelivery::release`], which consumes it.
#[derive(PartialEq, Eq)]
pub struct LocalHandle {
    id: u64,
    uri: String,
}

impl LocalHandle {
    /// Creates a handle. Only host implementations should call this.
    #[must_use]
    pub fn new(id: u64, uri: impl Into<String>) -> Self {
        Self {
            id,
            uri: uri.into(),
        }
    }

    /// Host-assigned identifier.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Addressable URI of the handle (e.g. `blob:docfetch/3`).
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl fmt::Debug for LocalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LocalHandle").field(&self.uri).finish()
    }
}

/// Save capabilities of the environment a retrieval runs in.
#[async_trait]
pub trait HostDelivery: Send + Sync {
    /// Asks the host to save `location` as `file_name` through its native
    /// mechanism, without the caller touching the bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`HostError`] when the host rejects the instruction.
    async fn deliver_direct(&self, location: &Url, file_name: &str) -> Result<(), HostError>;

    /// Makes `bytes` addressable as a save target.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::HandleLimit`] when no handle slot is free.
    fn materialize_handle(&self, bytes: Vec<u8>) -> Result<LocalHandle, HostError>;

    /// Saves the buffer behind `handle` as `file_name`.
    ///
    /// # Errors
    ///
    /// Returns a [`HostError`] when the save cannot be completed. No partial
    /// file may be left behind in that case.
    async fn save_handle(&self, handle: &LocalHandle, file_name: &str) -> Result<(), HostError>;

    /// Releases a handle and frees its buffer.
    fn release(&self, handle: LocalHandle);
}

/// Scope guard that releases a [`LocalHandle`] exactly once.
///
/// Call [`HandleGuard::release`] on the normal path; if the guard is dropped
/// while still holding the handle (early return, `?`, panic unwind) the
/// handle is released from `Drop`.
pub struct HandleGuard<'a> {
    host: &'a dyn HostDelivery,
    handle: Option<LocalHandle>,
}

impl<'a> HandleGuard<'a> {
    /// Takes ownership of `handle` on behalf of `host`.
    pub fn new(host: &'a dyn HostDelivery, handle: LocalHandle) -> Self {
        Self {
            host,
            handle: Some(handle),
        }
    }

    /// Borrows the guarded handle.
    #[must_use]
    pub fn handle(&self) -> &LocalHandle {
        match &self.handle {
            Some(handle) => handle,
            // Only emptied by `release(self)` and `drop`, both of which end
            // the guard's life.
            None => unreachable!("handle guard used after release"),
        }
    }

    /// Releases the handle now.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!(handle = %handle.uri(), "releasing local handle");
            self.host.release(handle);
        }
    }
}

impl Drop for HandleGuard<'_> {
    fn drop(&mut self) {
        self.release_inner();
    }
}
