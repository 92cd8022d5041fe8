//! Verified fetch: download the bytes, check them, then save through a
//! transient local handle.
//!
//! Only a fully received body that passes the format gate is ever handed to
//! the host, so a failed fetch can never produce a partial or wrong file.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, ClientBuilder};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::error::RetrievalError;
use super::host::{HandleGuard, HostDelivery};
use super::policy::{FetchPolicy, RetryDecision};
use super::request::DownloadRequest;
use super::verify;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Upper bound on the body buffer reserved up front from `Content-Length`.
const MAX_PREALLOCATED_BYTES: usize = 1024 * 1024;

/// A fully received response body.
#[derive(Debug)]
struct FetchedBody {
    bytes: Vec<u8>,
    content_type: Option<String>,
}

/// The verified-fetch strategy.
///
/// Cheap to clone: the underlying `reqwest::Client` is reference counted and
/// its connection pool is shared between clones.
#[derive(Debug, Clone)]
pub struct VerifiedFetch {
    client: Client,
    policy: FetchPolicy,
}

impl Default for VerifiedFetch {
    fn default() -> Self {
        Self::new()
    }
}

impl VerifiedFetch {
    /// Creates the strategy with the default connect timeout and no cookies.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let client = build_client(None, CONNECT_TIMEOUT_SECS)
            .expect("failed to build HTTP client with static configuration");
        Self::from_client(client)
    }

    /// Creates the strategy with an explicit connect timeout and an optional
    /// cookie jar whose cookies are sent with every fetch.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the HTTP client cannot be constructed.
    pub fn with_options(
        cookie_jar: Option<Arc<Jar>>,
        connect_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self::from_client(build_client(
            cookie_jar,
            connect_timeout_secs,
        )?))
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            policy: FetchPolicy::default(),
        }
    }

    /// Replaces the timeout/retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: FetchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Active timeout/retry policy.
    #[must_use]
    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Fetches `location`, verifies it against the request's format and
    /// saves it as the request's target file name.
    ///
    /// The handle materialized for the save is released on every path.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::Network`], [`RetrievalError::Timeout`],
    ///   [`RetrievalError::HttpStatus`] when the fetch fails
    /// - [`RetrievalError::FormatMismatch`] when neither the declared content
    ///   type nor the leading bytes match
    /// - [`RetrievalError::Host`] when the host cannot materialize or save
    #[instrument(skip(self, host, location, request), fields(strategy = "verified_fetch"))]
    pub async fn attempt(
        &self,
        host: &dyn HostDelivery,
        location: &Url,
        request: &DownloadRequest,
    ) -> Result<(), RetrievalError> {
        let signature = request.expected_format();
        let body = self.fetch_with_policy(location, signature.content_type()).await?;

        if verify::label_matches(body.content_type.as_deref(), signature) {
            debug!(content_type = ?body.content_type, "declared content type matches");
        } else if verify::matches(&body.bytes, signature) {
            debug!(
                content_type = ?body.content_type,
                "declared content type not conclusive; leading bytes match"
            );
        } else {
            return Err(RetrievalError::format_mismatch(
                location.as_str(),
                signature.name(),
                body.content_type,
                &body.bytes,
            ));
        }

        let size = body.bytes.len();
        let handle = host
            .materialize_handle(body.bytes)
            .map_err(|source| RetrievalError::host(location.as_str(), source))?;
        let guard = HandleGuard::new(host, handle);
        let saved = host
            .save_handle(guard.handle(), request.target_file_name())
            .await;
        guard.release();

        saved.map_err(|source| RetrievalError::host(location.as_str(), source))?;
        info!(bytes = size, file = %request.target_file_name(), "verified download saved");
        Ok(())
    }

    async fn fetch_with_policy(
        &self,
        location: &Url,
        accept: &str,
    ) -> Result<FetchedBody, RetrievalError> {
        let mut attempt = 1u32;
        loop {
            let result = match self.policy.timeout() {
                Some(limit) => tokio::time::timeout(limit, self.fetch_once(location, accept))
                    .await
                    .unwrap_or_else(|_| Err(RetrievalError::timeout(location.as_str()))),
                None => self.fetch_once(location, accept).await,
            };

            let error = match result {
                Ok(body) => return Ok(body),
                Err(error) => error,
            };

            match self.policy.retry().should_retry(&error, attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    debug!(error = %error, "fetch attempt failed");
                    warn!(
                        kind = %error.kind(),
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "fetch failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(reason = %reason, "not retrying fetch");
                    return Err(error);
                }
            }
        }
    }

    async fn fetch_once(&self, location: &Url, accept: &str) -> Result<FetchedBody, RetrievalError> {
        let url = location.as_str();
        debug!(url = %url, "sending fetch");

        let response = self
            .client
            .get(location.clone())
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(|e| RetrievalError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::http_status(url, status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(std::string::ToString::to_string);

        // Content-Length is only a hint from an untrusted server.
        let capacity = response
            .content_length()
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or(0)
            .min(MAX_PREALLOCATED_BYTES);
        let mut bytes = Vec::with_capacity(capacity);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| RetrievalError::network(url, e))?;
            bytes.extend_from_slice(&chunk);
        }

        debug!(bytes = bytes.len(), content_type = ?content_type, "fetch body received");
        Ok(FetchedBody {
            bytes,
            content_type,
        })
    }
}

fn build_client(
    cookie_jar: Option<Arc<Jar>>,
    connect_timeout_secs: u64,
) -> Result<Client, reqwest::Error> {
    let mut builder = ClientBuilder::new()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .user_agent(concat!("docfetch/", env!("CARGO_PKG_VERSION")))
        .gzip(true);
    if let Some(jar) = cookie_jar {
        builder = builder.cookie_provider(jar);
    }
    builder.build()
}
