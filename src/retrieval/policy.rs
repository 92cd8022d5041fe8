//! Timeout and retry extension points for the verified fetch.
//!
//! Both are off by default: a fetch runs until the server answers and is
//! attempted once. Callers opt in through [`FetchPolicy`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use docfetch_core::retrieval::{FetchPolicy, RetryPolicy};
//!
//! let policy = FetchPolicy::default()
//!     .with_timeout(Duration::from_secs(20))
//!     .with_retry(RetryPolicy::with_max_attempts(3));
//! assert_eq!(policy.retry().max_attempts(), 3);
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::error::RetrievalError;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (32 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Maximum jitter added to delays (500ms).
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Decision on whether to re-issue a failed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed).
        attempt: u32,
    },

    /// Give up and surface the error.
    DoNotRetry {
        /// Human-readable reason.
        reason: String,
    },
}

/// Retry behaviour for the network part of a verified fetch.
///
/// `max_attempts` counts the initial attempt, so the default of 1 means no
/// retries. Delays follow `min(base * multiplier^(attempt-1), max) + jitter`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: true,
        }
    }

    /// Creates a policy with custom settings (`max_attempts` is at least 1).
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
            jitter: true,
        }
    }

    /// Creates a policy with a custom `max_attempts`, other settings default.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::disabled()
        }
    }

    /// Disables random jitter (deterministic delays, mostly for tests).
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Maximum number of attempts including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides whether the fetch that just failed with `error` on `attempt`
    /// (1-indexed) should be re-issued.
    #[instrument(skip(self, error), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, error: &RetrievalError, attempt: u32) -> RetryDecision {
        if !is_transient(error) {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );
        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * multiplier.powf(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        let jitter = if self.jitter {
            let max_jitter_ms = u64::try_from(MAX_JITTER.as_millis()).unwrap_or(u64::MAX);
            Duration::from_millis(rand::thread_rng().gen_range(0..=max_jitter_ms))
        } else {
            Duration::ZERO
        };

        Duration::from_millis(capped_ms as u64) + jitter
    }
}

/// Returns true for failures a later attempt could plausibly fix.
///
/// | Failure | Transient |
/// |---------|-----------|
/// | Timeout, transport error | yes |
/// | HTTP 408, 429, 5xx | yes |
/// | Other HTTP status | no |
/// | Format mismatch, host failure, invalid location | no |
#[must_use]
pub fn is_transient(error: &RetrievalError) -> bool {
    match error {
        RetrievalError::Timeout { .. } | RetrievalError::Network { .. } => true,
        RetrievalError::HttpStatus { status, .. } => {
            matches!(*status, 408 | 429) || (500..600).contains(status)
        }
        RetrievalError::InvalidLocation { .. }
        | RetrievalError::Navigation { .. }
        | RetrievalError::FormatMismatch { .. }
        | RetrievalError::Host { .. } => false,
    }
}

/// Extension points applied to each verified fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchPolicy {
    timeout: Option<Duration>,
    retry: RetryPolicy,
}

impl FetchPolicy {
    /// Bounds each attempt (request plus full body) by `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Per-attempt timeout, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Retry policy.
    #[must_use]
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }
}
