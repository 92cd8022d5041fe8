//! Error types for the retrieval core.
//!
//! [`RetrievalError`] carries the full context of a failed strategy step for
//! logging. Callers only ever see its coarse [`ErrorKind`] through
//! `RetrievalState::Failed`.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use super::host::HostError;

/// Coarse failure classification reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The host rejected a direct delivery. Only ever triggers the fallback;
    /// never reported as a terminal state.
    NavigationFailure,
    /// Transport error, timeout, unresolvable location, or non-2xx status.
    NetworkFailure,
    /// Neither the declared content type nor the leading bytes match.
    FormatMismatch,
    /// The host could not materialize a handle or save it.
    HostFailure,
}

impl ErrorKind {
    /// Stable label for logs and JSON output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NavigationFailure => "navigation_failure",
            Self::NetworkFailure => "network_failure",
            Self::FormatMismatch => "format_mismatch",
            Self::HostFailure => "host_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by a single strategy attempt.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The source location is not an absolute URL and no origin resolves it.
    #[error("invalid source location: {location}")]
    InvalidLocation {
        /// The raw location string.
        location: String,
    },

    /// The host refused a direct delivery instruction.
    #[error("direct delivery of {url} rejected: {source}")]
    Navigation {
        /// The resolved location.
        url: String,
        /// Why the host refused.
        #[source]
        source: HostError,
    },

    /// Network-level error (DNS, connection refused, TLS, truncated body).
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL being fetched.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The fetch did not complete within the configured timeout.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL being fetched.
        url: String,
    },

    /// Non-2xx response status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL being fetched.
        url: String,
        /// The response status code.
        status: u16,
    },

    /// The response is not the expected format.
    #[error(
        "format mismatch for {url}: expected {expected}, got content type {} with leading bytes [{leading}]",
        .content_type.as_deref().unwrap_or("(none)")
    )]
    FormatMismatch {
        /// The URL being fetched.
        url: String,
        /// Display name of the expected format.
        expected: String,
        /// Declared content type, if any.
        content_type: Option<String>,
        /// Hex dump of the first few body bytes.
        leading: String,
    },

    /// The host failed while materializing or saving a verified buffer.
    #[error("host failed to save {url}: {source}")]
    Host {
        /// The URL whose bytes were being saved.
        url: String,
        /// The host error.
        #[source]
        source: HostError,
    },
}

/// Number of body bytes included in a format mismatch message.
const LEADING_BYTES_SHOWN: usize = 8;

impl RetrievalError {
    /// Creates an invalid location error.
    pub fn invalid_location(location: impl Into<String>) -> Self {
        Self::InvalidLocation {
            location: location.into(),
        }
    }

    /// Creates a navigation (direct delivery) error.
    pub fn navigation(url: impl Into<String>, source: HostError) -> Self {
        Self::Navigation {
            url: url.into(),
            source,
        }
    }

    /// Creates a network error from a reqwest error.
    ///
    /// Reqwest timeouts are reported as [`RetrievalError::Timeout`].
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::Timeout { url: url.into() };
        }
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a format mismatch error from the offending body.
    pub fn format_mismatch(
        url: impl Into<String>,
        expected: impl Into<String>,
        content_type: Option<String>,
        body: &[u8],
    ) -> Self {
        let leading = body
            .iter()
            .take(LEADING_BYTES_SHOWN)
            .map(|byte| format!("{byte:02x}"))
            .collect::<Vec<_>>()
            .join(" ");
        Self::FormatMismatch {
            url: url.into(),
            expected: expected.into(),
            content_type,
            leading,
        }
    }

    /// Creates a host failure error.
    pub fn host(url: impl Into<String>, source: HostError) -> Self {
        Self::Host {
            url: url.into(),
            source,
        }
    }

    /// Classifies the error for the caller-visible state.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Navigation { .. } => ErrorKind::NavigationFailure,
            Self::InvalidLocation { .. }
            | Self::Network { .. }
            | Self::Timeout { .. }
            | Self::HttpStatus { .. } => ErrorKind::NetworkFailure,
            Self::FormatMismatch { .. } => ErrorKind::FormatMismatch,
            Self::Host { .. } => ErrorKind::HostFailure,
        }
    }
}

// No `From<reqwest::Error>` / `From<HostError>`: every variant needs the URL
// for context, so the helper constructors are used instead.
