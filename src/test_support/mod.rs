//! Test doubles shared by the unit tests.

#![allow(clippy::unwrap_used)]

pub mod socket_guard;

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use url::Url;

use crate::retrieval::{HostDelivery, HostError, LocalHandle};

/// In-memory [`HostDelivery`] with scripted outcomes and call recording.
#[derive(Debug)]
pub struct ScriptedHost {
    accept_direct: bool,
    fail_saves: bool,
    panic_saves: bool,
    handle_limit: usize,
    next_id: AtomicU64,
    buffers: Mutex<HashMap<u64, Vec<u8>>>,
    direct_calls: Mutex<Vec<(String, String)>>,
    saved: Mutex<Vec<(String, Vec<u8>)>>,
    materialized: AtomicUsize,
    released: AtomicUsize,
}

impl ScriptedHost {
    fn scripted(accept_direct: bool) -> Self {
        Self {
            accept_direct,
            fail_saves: false,
            panic_saves: false,
            handle_limit: usize::MAX,
            next_id: AtomicU64::new(1),
            buffers: Mutex::new(HashMap::new()),
            direct_calls: Mutex::new(Vec::new()),
            saved: Mutex::new(Vec::new()),
            materialized: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    /// Host whose direct delivery always succeeds.
    pub fn accepting() -> Self {
        Self::scripted(true)
    }

    /// Host that rejects every direct delivery.
    pub fn rejecting_direct() -> Self {
        Self::scripted(false)
    }

    /// Makes every `save_handle` call fail.
    #[must_use]
    pub fn failing_saves(mut self) -> Self {
        self.fail_saves = true;
        self
    }

    /// Makes every `save_handle` call panic.
    #[must_use]
    pub fn panicking_saves(mut self) -> Self {
        self.panic_saves = true;
        self
    }

    #[must_use]
    pub fn with_handle_limit(mut self, limit: usize) -> Self {
        self.handle_limit = limit;
        self
    }

    /// `(location, file_name)` of every direct delivery attempt.
    pub fn direct_calls(&self) -> Vec<(String, String)> {
        self.direct_calls.lock().unwrap().clone()
    }

    /// `(file_name, bytes)` of every successful handle save.
    pub fn saved(&self) -> Vec<(String, Vec<u8>)> {
        self.saved.lock().unwrap().clone()
    }

    pub fn materialize_count(&self) -> usize {
        self.materialized.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn live_handles(&self) -> usize {
        self.buffers.lock().unwrap().len()
    }
}

#[async_trait]
impl HostDelivery for ScriptedHost {
    async fn deliver_direct(&self, location: &Url, file_name: &str) -> Result<(), HostError> {
        self.direct_calls
            .lock()
            .unwrap()
            .push((location.to_string(), file_name.to_string()));
        if self.accept_direct {
            Ok(())
        } else {
            Err(HostError::unsupported(location.scheme()))
        }
    }

    fn materialize_handle(&self, bytes: Vec<u8>) -> Result<LocalHandle, HostError> {
        let mut buffers = self.buffers.lock().unwrap();
        if buffers.len() >= self.handle_limit {
            return Err(HostError::HandleLimit {
                limit: self.handle_limit,
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        buffers.insert(id, bytes);
        self.materialized.fetch_add(1, Ordering::SeqCst);
        Ok(LocalHandle::new(id, format!("blob:test/{id}")))
    }

    async fn save_handle(&self, handle: &LocalHandle, file_name: &str) -> Result<(), HostError> {
        assert!(!self.panic_saves, "scripted save panic for {file_name}");
        if self.fail_saves {
            return Err(HostError::rejected("scripted save failure"));
        }
        let bytes = self
            .buffers
            .lock()
            .unwrap()
            .get(&handle.id())
            .cloned()
            .ok_or_else(|| HostError::UnknownHandle {
                uri: handle.uri().to_string(),
            })?;
        self.saved
            .lock()
            .unwrap()
            .push((file_name.to_string(), bytes));
        Ok(())
    }

    fn release(&self, handle: LocalHandle) {
        self.buffers.lock().unwrap().remove(&handle.id());
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}
