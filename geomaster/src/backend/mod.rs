//! Provider backends.
//!
//! A backend is the running provider process behind a manifest. The master
//! consumes it only through [`LocationBackend`]: query methods plus change
//! notifications pushed into a [`BackendEventSink`].
//!
//! Backends are created by a [`BackendConnector`] when the master activates
//! a provider. The sink handed to the connector is stamped with the
//! provider id and connection epoch, so events from a connection the master
//! already tore down are recognized and dropped.

mod manual;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::descriptor::ProviderDescriptor;
use crate::error::{LocationError, LocationResult};
use crate::location::{Address, Position, ProviderInfo, ProviderStatus};
use crate::master::{Epoch, MasterEvent, ProviderId};

pub use manual::{BuiltinConnector, ManualBackend, ManualLocation, MANUAL_SERVICE};

/// Boxed future used by the dyn-compatible backend traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Options forwarded to backends (`SetOptions`).
pub type BackendOptions = BTreeMap<String, String>;

/// A connected provider backend.
pub trait LocationBackend: Send + Sync {
    /// Name and description the backend reports about itself.
    fn provider_info(&self) -> BoxFuture<'_, LocationResult<ProviderInfo>>;

    /// Current backend status.
    fn status(&self) -> BoxFuture<'_, LocationResult<ProviderStatus>>;

    /// Apply provider-specific options.
    fn set_options(&self, options: BackendOptions) -> BoxFuture<'_, LocationResult<()>>;

    /// Take a reference on the backend, keeping it alive.
    fn add_reference(&self) -> BoxFuture<'_, LocationResult<()>>;

    /// Drop a reference taken with [`add_reference`](Self::add_reference).
    fn remove_reference(&self) -> BoxFuture<'_, LocationResult<()>>;

    /// Fetch the current position.
    fn position(&self) -> BoxFuture<'_, LocationResult<Position>> {
        Box::pin(async { Err(LocationError::NotImplemented("position".to_string())) })
    }

    /// Fetch the current address.
    fn address(&self) -> BoxFuture<'_, LocationResult<Address>> {
        Box::pin(async { Err(LocationError::NotImplemented("address".to_string())) })
    }
}

/// Creates backend connections for descriptors.
pub trait BackendConnector: Send + Sync {
    /// Connect to the backend described by `descriptor`.
    ///
    /// Change notifications must be delivered through `events` for as long
    /// as the returned backend is alive.
    fn connect<'a>(
        &'a self,
        descriptor: &'a ProviderDescriptor,
        events: BackendEventSink,
    ) -> BoxFuture<'a, LocationResult<Arc<dyn LocationBackend>>>;
}

/// A change notification pushed by a backend.
#[derive(Debug, Clone)]
pub enum BackendEvent {
    StatusChanged(ProviderStatus),
    PositionChanged(Position),
    AddressChanged(Address),
    /// The backend process went away.
    ConnectionLost,
}

/// Channel end a backend uses to notify the master.
#[derive(Debug, Clone)]
pub struct BackendEventSink {
    provider: ProviderId,
    epoch: Epoch,
    tx: mpsc::UnboundedSender<MasterEvent>,
}

impl BackendEventSink {
    pub fn new(provider: ProviderId, epoch: Epoch, tx: mpsc::UnboundedSender<MasterEvent>) -> Self {
        Self {
            provider,
            epoch,
            tx,
        }
    }

    /// Provider this sink reports for.
    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    /// Deliver an event. Returns false once the master has stopped.
    pub fn send(&self, event: BackendEvent) -> bool {
        self.tx
            .send(MasterEvent::Backend {
                provider: self.provider,
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }

    pub fn status_changed(&self, status: ProviderStatus) -> bool {
        self.send(BackendEvent::StatusChanged(status))
    }

    pub fn position_changed(&self, position: Position) -> bool {
        self.send(BackendEvent::PositionChanged(position))
    }

    pub fn address_changed(&self, address: Address) -> bool {
        self.send(BackendEvent::AddressChanged(address))
    }

    pub fn connection_lost(&self) -> bool {
        self.send(BackendEvent::ConnectionLost)
    }
}
