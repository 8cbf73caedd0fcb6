//! Helpers shared by the master unit tests.

use std::sync::Arc;

use super::Activation;
use crate::backend::{BackendOptions, BoxFuture, LocationBackend};
use crate::error::LocationResult;
use crate::location::{Address, Position, ProviderInfo, ProviderStatus};

/// Backend that answers every query trivially.
pub(crate) struct NullBackend;

impl LocationBackend for NullBackend {
    fn provider_info(&self) -> BoxFuture<'_, LocationResult<ProviderInfo>> {
        Box::pin(async { Ok(ProviderInfo::default()) })
    }

    fn status(&self) -> BoxFuture<'_, LocationResult<ProviderStatus>> {
        Box::pin(async { Ok(ProviderStatus::Available) })
    }

    fn set_options(&self, _options: BackendOptions) -> BoxFuture<'_, LocationResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn add_reference(&self) -> BoxFuture<'_, LocationResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn remove_reference(&self) -> BoxFuture<'_, LocationResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// A successful activation reporting `status` and the given initial values.
pub(crate) fn activation(
    status: ProviderStatus,
    position: Option<LocationResult<Position>>,
    address: Option<LocationResult<Address>>,
) -> Activation {
    Activation {
        backend: Arc::new(NullBackend),
        info: ProviderInfo::default(),
        status,
        position,
        address,
    }
}
