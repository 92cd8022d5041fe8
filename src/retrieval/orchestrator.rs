//! Retrieval orchestrator: sequences the two strategies and owns the
//! caller-visible state machine.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{Instrument, debug, info, info_span, warn};
use url::Url;

use super::direct::DirectDelivery;
use super::error::ErrorKind;
use super::fetch::VerifiedFetch;
use super::host::HostDelivery;
use super::policy::FetchPolicy;
use super::request::DownloadRequest;
use super::state::{Retrieval, RetrievalState, StateObserver, StateTracker};

/// Delivers [`DownloadRequest`]s through a [`HostDelivery`].
///
/// Direct delivery is tried first; only if the host rejects it does the
/// retriever fetch and verify the bytes itself. The two strategies never run
/// concurrently for one request, so the user never sees two save prompts.
///
/// `Retriever` holds no per-request state and is cheap to clone; every
/// [`retrieve`](Self::retrieve) call gets a fresh [`StateTracker`].
#[derive(Clone)]
pub struct Retriever {
    host: Arc<dyn HostDelivery>,
    direct: DirectDelivery,
    fetch: VerifiedFetch,
    origin: Option<Url>,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("fetch", &self.fetch)
            .field("origin", &self.origin.as_ref().map(Url::as_str))
            .finish_non_exhaustive()
    }
}

impl Retriever {
    /// Creates a retriever with a default [`VerifiedFetch`] and no origin.
    #[must_use]
    pub fn new(host: Arc<dyn HostDelivery>) -> Self {
        Self {
            host,
            direct: DirectDelivery::new(),
            fetch: VerifiedFetch::new(),
            origin: None,
        }
    }

    /// Base URL that relative source locations are resolved against.
    #[must_use]
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Replaces the verified-fetch strategy (custom client, cookies).
    #[must_use]
    pub fn with_fetch(mut self, fetch: VerifiedFetch) -> Self {
        self.fetch = fetch;
        self
    }

    /// Sets the timeout/retry extension points of the verified fetch.
    #[must_use]
    pub fn with_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch = self.fetch.with_policy(policy);
        self
    }

    /// Starts delivering `request` on a new tokio task.
    ///
    /// The returned [`Retrieval`] is already `InFlight`. Success or failure
    /// is observed through its state; nothing is returned or thrown.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use = "the Retrieval handle is the only way to observe the outcome"]
    pub fn retrieve(&self, request: DownloadRequest) -> Retrieval {
        self.spawn(request, StateTracker::new())
    }

    /// Like [`retrieve`](Self::retrieve), also reporting every state
    /// (starting with `Idle`) to `observer`.
    #[must_use = "the Retrieval handle is the only way to observe the outcome"]
    pub fn retrieve_with_observer(
        &self,
        request: DownloadRequest,
        observer: StateObserver,
    ) -> Retrieval {
        self.spawn(request, StateTracker::with_observer(observer))
    }

    fn spawn(&self, request: DownloadRequest, tracker: StateTracker) -> Retrieval {
        tracker.transition(RetrievalState::InFlight);
        let receiver = tracker.subscribe();
        let retriever = self.clone();
        let span = info_span!("retrieve", file = %request.target_file_name());
        let task = tokio::spawn(
            async move {
                retriever.drive(&request, &tracker).await;
            }
            .instrument(span),
        );
        Retrieval::new(receiver, task)
    }

    /// Runs `request` to a terminal state on the current task.
    ///
    /// `tracker` must be fresh (`Idle`); it is moved to `InFlight` here. If it
    /// is not `Idle` the call does nothing.
    pub async fn run(&self, request: &DownloadRequest, tracker: &StateTracker) {
        if !tracker.transition(RetrievalState::InFlight) {
            warn!("run called with a tracker that is not idle; ignoring");
            return;
        }
        self.drive(request, tracker).await;
    }

    /// Runs both strategies; a panic from the host or the fetch still ends in
    /// a terminal state (`Failed(HostFailure)`).
    async fn drive(&self, request: &DownloadRequest, tracker: &StateTracker) {
        let outcome = AssertUnwindSafe(self.run_strategies(request, tracker))
            .catch_unwind()
            .await;
        if outcome.is_err() {
            warn!("retrieval panicked; reporting host failure");
            tracker.transition(RetrievalState::Failed(ErrorKind::HostFailure));
        }
    }

    async fn run_strategies(&self, request: &DownloadRequest, tracker: &StateTracker) {
        let host = self.host.as_ref();
        let location = request.resolve(self.origin.as_ref());

        match &location {
            Ok(url) => match self
                .direct
                .attempt(host, url, request.target_file_name())
                .await
            {
                Ok(()) => {
                    info!("delivered directly");
                    tracker.transition(RetrievalState::Succeeded);
                    return;
                }
                Err(error) => {
                    debug!(error = %error, "direct delivery failed; falling back to verified fetch");
                }
            },
            Err(error) => {
                debug!(error = %error, "cannot resolve location for direct delivery");
            }
        }

        let outcome = match location {
            Ok(url) => self.fetch.attempt(host, &url, request).await,
            Err(error) => Err(error),
        };

        match outcome {
            Ok(()) => {
                tracker.transition(RetrievalState::Succeeded);
            }
            Err(error) => {
                let kind = error.kind();
                debug!(error = %error, "verified fetch failed");
                warn!(kind = %kind, "retrieval failed");
                tracker.transition(RetrievalState::Failed(kind));
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::test_support::ScriptedHost;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn recorder() -> (StateObserver, Arc<Mutex<Vec<RetrievalState>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer: StateObserver = Arc::new(move |state| sink.lock().unwrap().push(state));
        (observer, seen)
    }

    #[tokio::test]
    async fn test_retrieve_is_in_flight_immediately() {
        let host = Arc::new(ScriptedHost::accepting());
        let retriever =
            Retriever::new(host).with_origin(Url::parse("https://portfolio.example").unwrap());

        let retrieval = retriever.retrieve(DownloadRequest::pdf("/doc.pdf", "resume.pdf"));
        assert!(matches!(
            retrieval.state(),
            RetrievalState::InFlight | RetrievalState::Succeeded
        ));
        assert_eq!(retrieval.finished().await, RetrievalState::Succeeded);
    }

    #[tokio::test]
    async fn test_direct_success_skips_fetch() {
        let host = Arc::new(ScriptedHost::accepting());
        let retriever = Retriever::new(host.clone())
            .with_origin(Url::parse("https://portfolio.example").unwrap());
        let (observer, seen) = recorder();

        let state = retriever
            .retrieve_with_observer(DownloadRequest::pdf("/doc.pdf", "resume.pdf"), observer)
            .finished()
            .await;

        assert_eq!(state, RetrievalState::Succeeded);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                RetrievalState::Idle,
                RetrievalState::InFlight,
                RetrievalState::Succeeded
            ]
        );
        assert_eq!(host.materialize_count(), 0);
    }

    #[tokio::test]
    async fn test_unresolvable_location_fails_with_network_failure() {
        let host = Arc::new(ScriptedHost::accepting());
        let retriever = Retriever::new(host.clone());

        let state = retriever
            .retrieve(DownloadRequest::pdf("/doc.pdf", "resume.pdf"))
            .finished()
            .await;

        assert_eq!(state, RetrievalState::Failed(ErrorKind::NetworkFailure));
        assert!(host.direct_calls().is_empty());
    }

    #[tokio::test]
    async fn test_run_drives_tracker_inline() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/doc.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let host = Arc::new(ScriptedHost::rejecting_direct());
        let retriever =
            Retriever::new(host).with_origin(Url::parse(&mock_server.uri()).unwrap());
        let tracker = StateTracker::new();

        retriever
            .run(&DownloadRequest::pdf("/doc.pdf", "resume.pdf"), &tracker)
            .await;

        assert_eq!(
            tracker.current(),
            RetrievalState::Failed(ErrorKind::NetworkFailure)
        );
    }

    #[tokio::test]
    async fn test_panicking_host_still_reaches_terminal_state() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/doc.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7".to_vec()))
            .mount(&mock_server)
            .await;

        let host = Arc::new(ScriptedHost::rejecting_direct().panicking_saves());
        let retriever = Retriever::new(host.clone())
            .with_origin(Url::parse(&mock_server.uri()).unwrap());
        let (observer, seen) = recorder();

        let state = retriever
            .retrieve_with_observer(DownloadRequest::pdf("/doc.pdf", "resume.pdf"), observer)
            .finished()
            .await;

        assert_eq!(state, RetrievalState::Failed(ErrorKind::HostFailure));
        assert_eq!(
            seen.lock().unwrap().last(),
            Some(&RetrievalState::Failed(ErrorKind::HostFailure))
        );
        assert_eq!(host.release_count(), 1);
        assert_eq!(host.live_handles(), 0);
    }

    #[tokio::test]
    async fn test_run_ignores_used_tracker() {
        let host = Arc::new(ScriptedHost::accepting());
        let retriever = Retriever::new(host.clone())
            .with_origin(Url::parse("https://portfolio.example").unwrap());
        let tracker = StateTracker::new();
        let request = DownloadRequest::pdf("/doc.pdf", "resume.pdf");

        retriever.run(&request, &tracker).await;
        retriever.run(&request, &tracker).await;

        assert_eq!(tracker.current(), RetrievalState::Succeeded);
        assert_eq!(host.direct_calls().len(), 1);
    }
}
