//! Filesystem-backed [`HostDelivery`] for running retrievals in a local
//! process.
//!
//! Saves land in an output directory. Every save is written to a hidden
//! `.part` file first and renamed into place only once complete, so a failed
//! save never leaves a partial file behind.
//!
//! Direct delivery is native for `file://` sources (a plain copy). Remote
//! `http(s)` sources are streamed straight to disk only when remote delivery
//! is enabled; otherwise the host rejects them and the retriever falls back
//! to its verified fetch.

mod handles;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::filename::{resolve_unique_path, sanitize_filename, staging_path};
use crate::retrieval::{CONNECT_TIMEOUT_SECS, HostDelivery, HostError, LocalHandle};

use handles::HandleTable;

/// Default cap on simultaneously live local handles.
pub const DEFAULT_MAX_HANDLES: usize = 16;

/// Host that saves into a directory on the local filesystem.
#[derive(Debug)]
pub struct FilesystemHost {
    output_dir: PathBuf,
    handles: HandleTable,
    remote: Option<Client>,
    saved: Mutex<Vec<PathBuf>>,
    staging_token: AtomicU64,
}

impl FilesystemHost {
    /// Creates a host saving into `output_dir`, with remote direct delivery
    /// disabled and [`DEFAULT_MAX_HANDLES`] handle slots.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            handles: HandleTable::new(DEFAULT_MAX_HANDLES),
            remote: None,
            saved: Mutex::new(Vec::new()),
            staging_token: AtomicU64::new(0),
        }
    }

    /// Sets the number of handle slots.
    #[must_use]
    pub fn with_max_handles(mut self, max_handles: usize) -> Self {
        self.handles = HandleTable::new(max_handles);
        self
    }

    /// Enables streaming `http(s)` sources straight to disk on direct
    /// delivery, using `client`.
    #[must_use]
    pub fn with_remote_delivery(mut self, client: Client) -> Self {
        self.remote = Some(client);
        self
    }

    /// Enables remote direct delivery with a default client.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the HTTP client cannot be constructed.
    pub fn with_default_remote_delivery(self) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(concat!("docfetch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(self.with_remote_delivery(client))
    }

    /// Directory saves are written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Number of handles currently materialized and not yet released.
    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.handles.live()
    }

    /// Maximum number of live handles.
    #[must_use]
    pub fn max_handles(&self) -> usize {
        self.handles.limit()
    }

    /// Paths of every completed save, in completion order.
    pub async fn saved_paths(&self) -> Vec<PathBuf> {
        self.saved.lock().await.clone()
    }

    fn next_staging_path(&self, file_name: &str) -> PathBuf {
        let token = self.staging_token.fetch_add(1, Ordering::SeqCst);
        let base = self.output_dir.join(sanitize_filename(file_name));
        staging_path(&base, token)
    }

    /// Renames a completed staging file to a collision-free final path.
    async fn commit(&self, staging: &Path, file_name: &str) -> Result<PathBuf, HostError> {
        let mut saved = self.saved.lock().await;
        let final_path = match self.unique_path(file_name).await {
            Ok(path) => path,
            Err(error) => {
                discard(staging).await;
                return Err(error);
            }
        };
        if let Err(source) = tokio::fs::rename(staging, &final_path).await {
            discard(staging).await;
            return Err(HostError::io(final_path, source));
        }
        info!(path = %final_path.display(), "saved");
        saved.push(final_path.clone());
        Ok(final_path)
    }

    /// Probes the output directory for a free name off the async workers.
    async fn unique_path(&self, file_name: &str) -> Result<PathBuf, HostError> {
        let dir = self.output_dir.clone();
        let name = file_name.to_string();
        tokio::task::spawn_blocking(move || resolve_unique_path(&dir, &name))
            .await
            .map_err(|e| HostError::io(self.output_dir.clone(), std::io::Error::other(e)))
    }

    async fn ensure_output_dir(&self) -> Result<(), HostError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| HostError::io(self.output_dir.clone(), e))
    }

    async fn copy_local(&self, source: &Path, file_name: &str) -> Result<(), HostError> {
        self.ensure_output_dir().await?;
        let staging = self.next_staging_path(file_name);
        if let Err(error) = tokio::fs::copy(source, &staging).await {
            discard(&staging).await;
            return Err(HostError::io(source, error));
        }
        self.commit(&staging, file_name).await.map(|_| ())
    }

    async fn stream_remote(
        &self,
        client: &Client,
        location: &Url,
        file_name: &str,
    ) -> Result<(), HostError> {
        let response = client
            .get(location.clone())
            .send()
            .await
            .map_err(|e| HostError::rejected(format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(HostError::rejected(format!("HTTP {}", status.as_u16())));
        }

        self.ensure_output_dir().await?;
        let staging = self.next_staging_path(file_name);
        match stream_to_file(response, &staging).await {
            Ok(bytes) => {
                debug!(bytes, "remote stream complete");
                self.commit(&staging, file_name).await.map(|_| ())
            }
            Err(error) => {
                debug!(path = %staging.display(), "cleaning up partial file after error");
                discard(&staging).await;
                Err(error)
            }
        }
    }
}

#[async_trait]
impl HostDelivery for FilesystemHost {
    #[instrument(skip(self, location), fields(scheme = %location.scheme()))]
    async fn deliver_direct(&self, location: &Url, file_name: &str) -> Result<(), HostError> {
        match location.scheme() {
            "file" => {
                let source = location
                    .to_file_path()
                    .map_err(|()| HostError::rejected("file URL has no local path"))?;
                self.copy_local(&source, file_name).await
            }
            "http" | "https" => match &self.remote {
                Some(client) => self.stream_remote(client, location, file_name).await,
                None => Err(HostError::unsupported(location.scheme())),
            },
            other => Err(HostError::unsupported(other)),
        }
    }

    fn materialize_handle(&self, bytes: Vec<u8>) -> Result<LocalHandle, HostError> {
        self.handles.insert(bytes)
    }

    #[instrument(skip(self, handle), fields(handle = %handle.uri()))]
    async fn save_handle(&self, handle: &LocalHandle, file_name: &str) -> Result<(), HostError> {
        let bytes = self.handles.bytes(handle)?;
        self.ensure_output_dir().await?;

        let staging = self.next_staging_path(file_name);
        if let Err(error) = write_file(&staging, &bytes).await {
            discard(&staging).await;
            return Err(error);
        }
        self.commit(&staging, file_name).await.map(|_| ())
    }

    fn release(&self, handle: LocalHandle) {
        self.handles.remove(handle);
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), HostError> {
    let mut file = File::create(path)
        .await
        .map_err(|e| HostError::io(path, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| HostError::io(path, e))?;
    file.flush().await.map_err(|e| HostError::io(path, e))
}

async fn stream_to_file(response: reqwest::Response, path: &Path) -> Result<u64, HostError> {
    let file = File::create(path)
        .await
        .map_err(|e| HostError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk =
            chunk_result.map_err(|e| HostError::rejected(format!("stream interrupted: {e}")))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| HostError::io(path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| HostError::io(path, e))?;
    Ok(bytes_written)
}

async fn discard(path: &Path) {
    if let Err(error) = tokio::fs::remove_file(path).await
        && error.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %error, "failed to remove partial file");
    }
}
