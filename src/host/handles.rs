//! Bounded table of materialized buffers backing [`LocalHandle`]s.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::retrieval::{HostError, LocalHandle};

/// URI prefix of handles issued by the filesystem host.
const HANDLE_URI_PREFIX: &str = "blob:docfetch/";

/// Buffers addressable through handle ids, with a cap on live entries.
#[derive(Debug)]
pub(crate) struct HandleTable {
    buffers: DashMap<u64, Arc<Vec<u8>>>,
    next_id: AtomicU64,
    live: AtomicUsize,
    limit: usize,
}

impl HandleTable {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            buffers: DashMap::new(),
            next_id: AtomicU64::new(1),
            live: AtomicUsize::new(0),
            limit,
        }
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit
    }

    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Registers `bytes` and returns a handle, or fails when every slot is
    /// taken.
    pub(crate) fn insert(&self, bytes: Vec<u8>) -> Result<LocalHandle, HostError> {
        let limit = self.limit;
        self.live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                (live < limit).then_some(live + 1)
            })
            .map_err(|_| HostError::HandleLimit { limit })?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let size = bytes.len();
        self.buffers.insert(id, Arc::new(bytes));
        debug!(handle = id, bytes = size, "materialized local handle");
        Ok(LocalHandle::new(id, format!("{HANDLE_URI_PREFIX}{id}")))
    }

    /// Returns the buffer behind a live handle.
    pub(crate) fn bytes(&self, handle: &LocalHandle) -> Result<Arc<Vec<u8>>, HostError> {
        self.buffers
            .get(&handle.id())
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| HostError::UnknownHandle {
                uri: handle.uri().to_string(),
            })
    }

    /// Frees the slot held by `handle`.
    pub(crate) fn remove(&self, handle: LocalHandle) {
        if self.buffers.remove(&handle.id()).is_some() {
            self.live.fetch_sub(1, Ordering::SeqCst);
        } else {
            warn!(handle = %handle.uri(), "release of unknown local handle");
        }
    }
}
