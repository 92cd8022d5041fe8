//! [`HostDelivery`] double that records every host interaction in order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docfetch_core::{HostDelivery, HostError, LocalHandle};
use url::Url;
use wiremock::{Request, Respond, ResponseTemplate};

/// Shared, ordered log of host and server events.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub struct RecordingHost {
    accept_direct: bool,
    direct_delay: Duration,
    fail_saves: bool,
    log: EventLog,
    next_id: AtomicU64,
    buffers: Mutex<HashMap<u64, Vec<u8>>>,
    saved: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingHost {
    fn new(accept_direct: bool) -> Self {
        Self {
            accept_direct,
            direct_delay: Duration::ZERO,
            fail_saves: false,
            log: event_log(),
            next_id: AtomicU64::new(1),
            buffers: Mutex::new(HashMap::new()),
            saved: Mutex::new(Vec::new()),
        }
    }

    pub fn accepting() -> Self {
        Self::new(true)
    }

    pub fn rejecting_direct() -> Self {
        Self::new(false)
    }

    pub fn with_direct_delay(mut self, delay: Duration) -> Self {
        self.direct_delay = delay;
        self
    }

    pub fn failing_saves(mut self) -> Self {
        self.fail_saves = true;
        self
    }

    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| event.starts_with(prefix))
            .count()
    }

    pub fn saved(&self) -> Vec<(String, Vec<u8>)> {
        self.saved.lock().unwrap().clone()
    }

    pub fn live_handles(&self) -> usize {
        self.buffers.lock().unwrap().len()
    }

    fn record(&self, event: impl Into<String>) {
        self.log.lock().unwrap().push(event.into());
    }
}

#[async_trait]
impl HostDelivery for RecordingHost {
    async fn deliver_direct(&self, location: &Url, file_name: &str) -> Result<(), HostError> {
        self.record(format!("direct_start {location} {file_name}"));
        if !self.direct_delay.is_zero() {
            tokio::time::sleep(self.direct_delay).await;
        }
        self.record("direct_end");
        if self.accept_direct {
            Ok(())
        } else {
            Err(HostError::unsupported(location.scheme()))
        }
    }

    fn materialize_handle(&self, bytes: Vec<u8>) -> Result<LocalHandle, HostError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.buffers.lock().unwrap().insert(id, bytes);
        self.record(format!("materialize {id}"));
        Ok(LocalHandle::new(id, format!("blob:recording/{id}")))
    }

    async fn save_handle(&self, handle: &LocalHandle, file_name: &str) -> Result<(), HostError> {
        self.record(format!("save {} {file_name}", handle.id()));
        if self.fail_saves {
            return Err(HostError::rejected("recording host refuses saves"));
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
        self.saved.lock().unwrap().push((file_name.to_string(), bytes));
        Ok(())
    }

    fn release(&self, handle: LocalHandle) {
        self.buffers.lock().unwrap().remove(&handle.id());
        self.record(format!("release {}", handle.id()));
    }
}

/// Responder that appends `fetch` to an [`EventLog`] before answering.
pub struct LoggingResponder {
    log: EventLog,
    template: ResponseTemplate,
}

impl LoggingResponder {
    pub fn new(log: EventLog, template: ResponseTemplate) -> Self {
        Self { log, template }
    }
}

impl Respond for LoggingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.log.lock().unwrap().push("fetch".to_string());
        self.template.clone()
    }
}
