//! Built-in manual provider.
//!
//! Serves a statically configured position and/or address. Manifests select
//! it with `Service=builtin:manual`; every other service identifier is
//! reported unreachable by [`BuiltinConnector`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{BackendConnector, BackendEventSink, BackendOptions, BoxFuture, LocationBackend};
use crate::accuracy::{Accuracy, AccuracyLevel};
use crate::descriptor::ProviderDescriptor;
use crate::error::{LocationError, LocationResult};
use crate::location::{address_keys, Address, Position, ProviderInfo, ProviderStatus};

/// Service identifier of the built-in manual backend.
pub const MANUAL_SERVICE: &str = "builtin:manual";

/// A manually configured location.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManualLocation {
    pub position: Option<Position>,
    pub address: Option<Address>,
}

impl ManualLocation {
    /// Returns true if neither a position nor an address is set.
    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.address.is_none()
    }

    /// Build an address from details, deriving the accuracy from the most
    /// precise key present.
    pub fn address_from_details(details: BTreeMap<String, String>) -> Address {
        let level = if details.contains_key(address_keys::STREET) {
            AccuracyLevel::Street
        } else if details.contains_key(address_keys::POSTAL_CODE) {
            AccuracyLevel::PostalCode
        } else if details.contains_key(address_keys::LOCALITY)
            || details.contains_key(address_keys::AREA)
        {
            AccuracyLevel::Locality
        } else if details.contains_key(address_keys::REGION) {
            AccuracyLevel::Region
        } else if details.contains_key(address_keys::COUNTRY)
            || details.contains_key(address_keys::COUNTRY_CODE)
        {
            AccuracyLevel::Country
        } else {
            AccuracyLevel::None
        };
        Address::new(details, Accuracy::from_level(level))
    }
}

/// Backend serving a [`ManualLocation`].
pub struct ManualBackend {
    location: Mutex<ManualLocation>,
    references: AtomicUsize,
    events: BackendEventSink,
}

impl ManualBackend {
    pub fn new(location: ManualLocation, events: BackendEventSink) -> Self {
        Self {
            location: Mutex::new(location),
            references: AtomicUsize::new(0),
            events,
        }
    }

    /// Number of references currently held on the backend.
    pub fn references(&self) -> usize {
        self.references.load(Ordering::SeqCst)
    }

    /// Replace the served location and notify the master.
    pub fn set_location(&self, location: ManualLocation) {
        let status = Self::status_for(&location);
        *self.location.lock() = location.clone();

        self.events.status_changed(status);
        if let Some(position) = location.position {
            self.events.position_changed(position);
        }
        if let Some(address) = location.address {
            self.events.address_changed(address);
        }
    }

    fn status_for(location: &ManualLocation) -> ProviderStatus {
        if location.is_empty() {
            ProviderStatus::Unavailable
        } else {
            ProviderStatus::Available
        }
    }
}

impl LocationBackend for ManualBackend {
    fn provider_info(&self) -> BoxFuture<'_, LocationResult<ProviderInfo>> {
        Box::pin(async {
            Ok(ProviderInfo::new(
                "Manual",
                "Manual provider serving a configured location",
            ))
        })
    }

    fn status(&self) -> BoxFuture<'_, LocationResult<ProviderStatus>> {
        Box::pin(async move { Ok(Self::status_for(&self.location.lock())) })
    }

    fn set_options(&self, options: BackendOptions) -> BoxFuture<'_, LocationResult<()>> {
        Box::pin(async move {
            debug!(count = options.len(), "Manual backend ignores options");
            Ok(())
        })
    }

    fn add_reference(&self) -> BoxFuture<'_, LocationResult<()>> {
        Box::pin(async move {
            self.references.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn remove_reference(&self) -> BoxFuture<'_, LocationResult<()>> {
        Box::pin(async move {
            let _ = self
                .references
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            Ok(())
        })
    }

    fn position(&self) -> BoxFuture<'_, LocationResult<Position>> {
        Box::pin(async move {
            self.location
                .lock()
                .position
                .clone()
                .ok_or_else(|| LocationError::NotAvailable("No manual position set".to_string()))
        })
    }

    fn address(&self) -> BoxFuture<'_, LocationResult<Address>> {
        Box::pin(async move {
            self.location
                .lock()
                .address
                .clone()
                .ok_or_else(|| LocationError::NotAvailable("No manual address set".to_string()))
        })
    }
}

/// Connector for backends compiled into the master.
#[derive(Debug, Clone, Default)]
pub struct BuiltinConnector {
    manual: ManualLocation,
}

impl BuiltinConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the location served by the manual backend.
    pub fn with_manual_location(mut self, location: ManualLocation) -> Self {
        self.manual = location;
        self
    }
}

impl BackendConnector for BuiltinConnector {
    fn connect<'a>(
        &'a self,
        descriptor: &'a ProviderDescriptor,
        events: BackendEventSink,
    ) -> BoxFuture<'a, LocationResult<Arc<dyn LocationBackend>>> {
        Box::pin(async move {
            if descriptor.service != MANUAL_SERVICE {
                return Err(LocationError::NotAvailable(format!(
                    "No backend for service '{}'",
                    descriptor.service
                )));
            }

            info!(provider = %descriptor.name, "Connected built-in manual backend");
            let backend: Arc<dyn LocationBackend> =
                Arc::new(ManualBackend::new(self.manual.clone(), events));
            Ok(backend)
        })
    }
}
