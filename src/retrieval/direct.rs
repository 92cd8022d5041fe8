//! Direct delivery: hand the location to the host and let it save the file.
//!
//! This is the fast path. The bytes never pass through the retriever, so
//! nothing is verified; trust is delegated to the host mechanism.

use tracing::{debug, instrument};
use url::Url;

use super::error::RetrievalError;
use super::host::HostDelivery;

/// The direct-delivery strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectDelivery;

impl DirectDelivery {
    /// Creates the strategy.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Submits a save instruction for `location` as `file_name`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Navigation`] when the host rejects the
    /// instruction.
    #[instrument(skip(self, host, location), fields(strategy = "direct"))]
    pub async fn attempt(
        &self,
        host: &dyn HostDelivery,
        location: &Url,
        file_name: &str,
    ) -> Result<(), RetrievalError> {
        match host.deliver_direct(location, file_name).await {
            Ok(()) => {
                debug!("host accepted direct delivery");
                Ok(())
            }
            Err(source) => Err(RetrievalError::navigation(location.as_str(), source)),
        }
    }
}
