//! Rendering of retrieval states for the terminal.

use std::path::PathBuf;
use std::time::Duration;

use docfetch_core::{ErrorKind, RetrievalState};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

/// Label shown while a retrieval is in flight.
pub(crate) const LOADING_LABEL: &str = "Downloading...";
/// Label shown after a retrieval failed.
pub(crate) const FAILED_LABEL: &str = "Download Failed";

/// Indicator text for `state`: loading, error, or the default affordance.
pub(crate) fn state_label(state: RetrievalState, file_name: &str) -> String {
    match state {
        RetrievalState::InFlight => LOADING_LABEL.to_string(),
        RetrievalState::Failed(_) => FAILED_LABEL.to_string(),
        RetrievalState::Idle | RetrievalState::Succeeded => format!("Download {file_name}"),
    }
}

/// One-line description of why a retrieval failed.
pub(crate) fn failure_hint(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::NetworkFailure => "the document could not be fetched",
        ErrorKind::FormatMismatch => "the server did not return the expected file format",
        ErrorKind::HostFailure => "the document could not be saved",
        ErrorKind::NavigationFailure => "the save location was rejected",
    }
}

/// Terminal outcome printed by `--json`.
///
/// The state is flattened from [`RetrievalState`]'s own serialization into
/// `state` and, for failures, `error`.
#[derive(Debug, Serialize)]
pub(crate) struct Outcome {
    pub(crate) source: String,
    pub(crate) file_name: String,
    #[serde(flatten)]
    pub(crate) state: RetrievalState,
    pub(crate) saved_to: Option<PathBuf>,
    pub(crate) elapsed_ms: u64,
}

impl Outcome {
    pub(crate) fn new(
        source: &str,
        file_name: &str,
        state: RetrievalState,
        saved_to: Option<PathBuf>,
        elapsed: Duration,
    ) -> Self {
        Self {
            source: source.to_string(),
            file_name: file_name.to_string(),
            state,
            saved_to,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Spinner showing the loading indicator while a retrieval is in flight.
pub(crate) fn start_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(LOADING_LABEL);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}
