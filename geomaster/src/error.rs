//! Error types shared by the master core and the service layer.

use thiserror::Error;

use crate::master::ClientId;

/// Result type for provider-level operations.
pub type LocationResult<T> = Result<T, LocationError>;

/// Errors reported by provider backends and by the arbitration core.
///
/// Values are `Clone` because a failed fetch is cached on the master provider
/// and copied to every caller that polls it afterwards.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocationError {
    /// The backend does not implement the requested method.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Transient: the backend is reachable but has no current data.
    #[error("Not available: {0}")]
    NotAvailable(String),

    /// Generic backend failure.
    #[error("Failed: {0}")]
    Failed(String),

    /// The operation is invalid given the client's current state.
    #[error("Requirements conflict: {0}")]
    RequirementsConflict(String),
}

impl LocationError {
    /// Error surfaced by a client that has no active provider for a capability.
    pub fn no_usable_provider() -> Self {
        LocationError::NotAvailable("No usable providers".to_string())
    }

    /// Whether this error means the backend service could not be reached.
    ///
    /// Cacheable-on-connection providers that fail this way are held
    /// unavailable until connectivity comes back online.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, LocationError::NotAvailable(_))
    }
}

/// Errors returned by the master API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MasterError {
    /// A provider-level error.
    #[error(transparent)]
    Location(#[from] LocationError),

    /// The client id is not (or no longer) registered.
    #[error("Unknown client: {0}")]
    UnknownClient(ClientId),

    /// The master service task has stopped.
    #[error("Master service is not running")]
    ServiceStopped,
}
