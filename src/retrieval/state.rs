//! Caller-visible retrieval state machine.
//!
//! ```text
//! Idle ──> InFlight ──> Succeeded
//!                  └──> Failed(kind)
//! ```
//!
//! Every `retrieve` call gets its own [`StateTracker`]; nothing here is
//! shared between requests.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::error::ErrorKind;

/// State of one retrieval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum RetrievalState {
    /// Not started.
    Idle,
    /// A strategy attempt is running.
    InFlight,
    /// A save has been triggered.
    Succeeded,
    /// Terminal failure; no partial file was saved.
    Failed(ErrorKind),
}

impl RetrievalState {
    /// Returns true for `Succeeded` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }

    /// Returns true if `self -> next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::InFlight) | (Self::InFlight, Self::Succeeded | Self::Failed(_))
        )
    }
}

impl fmt::Display for RetrievalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::InFlight => f.write_str("in_flight"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed(kind) => write!(f, "failed({kind})"),
        }
    }
}

/// Callback invoked with every state a request enters, starting with `Idle`.
pub type StateObserver = Arc<dyn Fn(RetrievalState) + Send + Sync>;

/// Owner side of one request's state.
///
/// Publishes transitions on a `watch` channel and to an optional observer.
pub struct StateTracker {
    sender: watch::Sender<RetrievalState>,
    observer: Option<StateObserver>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    /// Creates a tracker in `Idle`.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(RetrievalState::Idle);
        Self {
            sender,
            observer: None,
        }
    }

    /// Creates a tracker in `Idle` and reports `Idle` to `observer`.
    #[must_use]
    pub fn with_observer(observer: StateObserver) -> Self {
        observer(RetrievalState::Idle);
        let (sender, _receiver) = watch::channel(RetrievalState::Idle);
        Self {
            sender,
            observer: Some(observer),
        }
    }

    /// Current state.
    #[must_use]
    pub fn current(&self) -> RetrievalState {
        *self.sender.borrow()
    }

    /// Subscribes to future transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RetrievalState> {
        self.sender.subscribe()
    }

    /// Moves to `next` if the transition is legal.
    ///
    /// Returns false (and changes nothing) for illegal transitions.
    pub fn transition(&self, next: RetrievalState) -> bool {
        let current = self.current();
        if !current.can_transition_to(next) {
            warn!(from = %current, to = %next, "ignoring illegal retrieval state transition");
            return false;
        }
        debug!(from = %current, to = %next, "retrieval state transition");
        self.sender.send_replace(next);
        if let Some(observer) = &self.observer {
            observer(next);
        }
        true
    }
}

/// Caller handle to a spawned retrieval.
///
/// Dropping it does not stop the retrieval; once `InFlight`, a request always
/// runs to a terminal state.
#[derive(Debug)]
pub struct Retrieval {
    state: watch::Receiver<RetrievalState>,
    task: JoinHandle<()>,
}

impl Retrieval {
    pub(crate) fn new(state: watch::Receiver<RetrievalState>, task: JoinHandle<()>) -> Self {
        Self { state, task }
    }

    /// Polls the current state.
    #[must_use]
    pub fn state(&self) -> RetrievalState {
        *self.state.borrow()
    }

    /// Subscribes to state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RetrievalState> {
        self.state.clone()
    }

    /// Waits for the retrieval task to finish and returns its terminal state.
    ///
    /// If the task was cancelled (runtime shutdown) before reaching a terminal
    /// state, the last published state is returned.
    pub async fn finished(self) -> RetrievalState {
        let Self { state, task } = self;
        if let Err(error) = task.await {
            warn!(error = %error, "retrieval task ended abnormally");
        }
        *state.borrow()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_legal_transitions() {
        assert!(RetrievalState::Idle.can_transition_to(RetrievalState::InFlight));
        assert!(RetrievalState::InFlight.can_transition_to(RetrievalState::Succeeded));
        assert!(
            RetrievalState::InFlight
                .can_transition_to(RetrievalState::Failed(ErrorKind::FormatMismatch))
        );
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!RetrievalState::Idle.can_transition_to(RetrievalState::Succeeded));
        assert!(!RetrievalState::Succeeded.can_transition_to(RetrievalState::InFlight));
        assert!(
            !RetrievalState::Failed(ErrorKind::NetworkFailure)
                .can_transition_to(RetrievalState::Succeeded)
        );
        assert!(!RetrievalState::InFlight.can_transition_to(RetrievalState::InFlight));
    }

    #[test]
    fn test_tracker_ignores_illegal_transition() {
        let tracker = StateTracker::new();
        assert!(!tracker.transition(RetrievalState::Succeeded));
        assert_eq!(tracker.current(), RetrievalState::Idle);
    }

    #[test]
    fn test_tracker_reports_every_state_to_observer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let tracker = StateTracker::with_observer(Arc::new(move |state| {
            sink.lock().unwrap().push(state);
        }));

        tracker.transition(RetrievalState::InFlight);
        tracker.transition(RetrievalState::Failed(ErrorKind::NetworkFailure));
        // Terminal: ignored.
        tracker.transition(RetrievalState::Succeeded);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                RetrievalState::Idle,
                RetrievalState::InFlight,
                RetrievalState::Failed(ErrorKind::NetworkFailure),
            ]
        );
    }

    #[tokio::test]
    async fn test_subscriber_sees_latest_state() {
        let tracker = StateTracker::new();
        let mut receiver = tracker.subscribe();
        tracker.transition(RetrievalState::InFlight);
        receiver.changed().await.unwrap();
        assert_eq!(*receiver.borrow(), RetrievalState::InFlight);
    }

    #[test]
    fn test_state_serializes_with_tag() {
        let json = serde_json::to_string(&RetrievalState::Failed(ErrorKind::FormatMismatch))
            .unwrap();
        assert_eq!(json, r#"{"state":"failed","error":"format_mismatch"}"#);
        let json = serde_json::to_string(&RetrievalState::Succeeded).unwrap();
        assert_eq!(json, r#"{"state":"succeeded"}"#);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            RetrievalState::Failed(ErrorKind::NetworkFailure).to_string(),
            "failed(network_failure)"
        );
        assert_eq!(RetrievalState::InFlight.to_string(), "in_flight");
    }
}
