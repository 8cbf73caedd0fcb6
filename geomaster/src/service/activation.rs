//! Backend work executed outside the arbitration task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::backend::{BackendConnector, BackendEventSink, BackendOptions, LocationBackend};
use crate::descriptor::ProviderDescriptor;
use crate::error::LocationResult;
use crate::location::{Address, Capability, Position, ProviderInfo, ProviderStatus};
use crate::master::{Activation, Epoch, FetchOutcome, FetchRequest, MasterEvent, ProviderId};

/// Connect a provider backend and report the outcome as
/// [`MasterEvent::Activated`].
pub(crate) async fn activate(
    connector: Arc<dyn BackendConnector>,
    provider: ProviderId,
    epoch: Epoch,
    descriptor: ProviderDescriptor,
    events: mpsc::UnboundedSender<MasterEvent>,
) {
    let sink = BackendEventSink::new(provider, epoch, events.clone());
    let outcome = connect(connector.as_ref(), &descriptor, sink).await;
    if let Err(err) = &outcome {
        debug!(provider = %descriptor.name, error = %err, "Backend connection failed");
    }
    let _ = events.send(MasterEvent::Activated {
        provider,
        epoch,
        outcome,
    });
}

async fn connect(
    connector: &dyn BackendConnector,
    descriptor: &ProviderDescriptor,
    sink: BackendEventSink,
) -> LocationResult<Activation> {
    let backend = connector.connect(descriptor, sink).await?;
    backend.add_reference().await?;

    match read_initial(backend.as_ref(), descriptor).await {
        Ok((info, status, position, address)) => Ok(Activation {
            backend,
            info,
            status,
            position,
            address,
        }),
        Err(err) => {
            release(backend).await;
            Err(err)
        }
    }
}

type Initial = (
    ProviderInfo,
    ProviderStatus,
    Option<LocationResult<Position>>,
    Option<LocationResult<Address>>,
);

async fn read_initial(
    backend: &dyn LocationBackend,
    descriptor: &ProviderDescriptor,
) -> LocationResult<Initial> {
    let info = match backend.provider_info().await {
        Ok(info) => info,
        Err(err) => {
            debug!(provider = %descriptor.name, error = %err, "Backend did not report its info");
            ProviderInfo::new(descriptor.name.clone(), descriptor.description.clone())
        }
    };
    let status = backend.status().await?;

    let position = if descriptor.supports(Capability::Position) {
        Some(backend.position().await)
    } else {
        None
    };
    let address = if descriptor.supports(Capability::Address) {
        Some(backend.address().await)
    } else {
        None
    };
    Ok((info, status, position, address))
}

/// Drop the master's reference on a backend.
pub(crate) async fn release(backend: Arc<dyn LocationBackend>) {
    if let Err(err) = backend.remove_reference().await {
        warn!(error = %err, "Failed to release backend");
    }
}

pub(crate) async fn set_options(
    provider: ProviderId,
    backend: Arc<dyn LocationBackend>,
    options: BackendOptions,
) {
    if let Err(err) = backend.set_options(options).await {
        warn!(provider = %provider, error = %err, "Backend rejected options");
    }
}

/// Read the position straight from a backend and post it back to the master.
pub(crate) async fn fetch_position(
    request: FetchRequest,
    events: &mpsc::UnboundedSender<MasterEvent>,
) -> LocationResult<Position> {
    let result = request.backend.position().await;
    post_fetched(&request, FetchOutcome::Position(result.clone()), events);
    result
}

/// Read the address straight from a backend and post it back to the master.
pub(crate) async fn fetch_address(
    request: FetchRequest,
    events: &mpsc::UnboundedSender<MasterEvent>,
) -> LocationResult<Address> {
    let result = request.backend.address().await;
    post_fetched(&request, FetchOutcome::Address(result.clone()), events);
    result
}

fn post_fetched(
    request: &FetchRequest,
    outcome: FetchOutcome,
    events: &mpsc::UnboundedSender<MasterEvent>,
) {
    debug!(provider = %request.provider, capability = %request.capability, "Fetched from backend");
    let _ = events.send(MasterEvent::Fetched {
        provider: request.provider,
        epoch: request.epoch,
        outcome,
    });
}
