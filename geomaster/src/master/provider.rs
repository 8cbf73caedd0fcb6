//! Master-side state of one provider.
//!
//! A [`MasterProvider`] wraps a descriptor, at most one live backend
//! connection, the last-known position/address and the set of subscribed
//! clients. It turns backend notifications into [`ProviderNotice`]s that
//! drive client re-selection.
//!
//! # Connection lifecycle
//!
//! ```text
//! Uninitialized ──subscribe──► Activating ──Activated──► Running
//!                                  ▲                        │
//!                                  └──────subscribe──── Stopped ◄── idle / lost
//! ```
//!
//! Providers that are cacheable on connection never run permanently: every
//! transition into `Online` performs a one-shot activation that fetches the
//! current values and releases the backend again.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::cache::{Stored, ValueCache};
use super::events::{
    Activation, BackendCommand, FetchOutcome, FetchRequest, Outbox, ProviderDetails,
    ProviderNotice,
};
use super::{ClientId, Epoch, ProviderId, Requirements, ShutdownPolicy};
use crate::accuracy::Accuracy;
use crate::backend::{BackendEvent, BackendOptions, LocationBackend};
use crate::connectivity::ConnectivityStatus;
use crate::descriptor::ProviderDescriptor;
use crate::error::{LocationError, LocationResult};
use crate::location::{Address, Capability, Position, ProviderInfo, ProviderStatus};

/// State of a provider's backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    /// Never activated.
    Uninitialized,
    /// Activation requested, waiting for the backend.
    Activating,
    /// Backend connected.
    Running,
    /// Backend released or lost.
    Stopped,
}

/// Values clients react to, captured before and after a mutation.
#[derive(Debug, Clone, Copy)]
struct Observed {
    status: ProviderStatus,
    position: Accuracy,
    address: Accuracy,
}

/// One provider as seen by the master.
pub struct MasterProvider {
    id: ProviderId,
    descriptor: ProviderDescriptor,
    info: Option<ProviderInfo>,
    state: ConnectionState,
    epoch: Epoch,
    /// The pending activation is a one-shot fetch.
    once: bool,
    backend: Option<Arc<dyn LocationBackend>>,
    backend_status: ProviderStatus,
    connectivity: ConnectivityStatus,
    /// Cacheable provider whose service could not be reached this session.
    unreachable: bool,
    position: ValueCache<Position>,
    address: ValueCache<Address>,
    position_subscribers: BTreeSet<ClientId>,
    address_subscribers: BTreeSet<ClientId>,
}

impl MasterProvider {
    pub fn new(id: ProviderId, descriptor: ProviderDescriptor) -> Self {
        Self {
            id,
            descriptor,
            info: None,
            state: ConnectionState::Uninitialized,
            epoch: Epoch::default(),
            once: false,
            backend: None,
            backend_status: ProviderStatus::Unavailable,
            connectivity: ConnectivityStatus::Unknown,
            unreachable: false,
            position: ValueCache::default(),
            address: ValueCache::default(),
            position_subscribers: BTreeSet::new(),
            address_subscribers: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> ProviderId {
        self.id
    }

    pub fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Status last reported by the backend.
    pub fn backend_status(&self) -> ProviderStatus {
        self.backend_status
    }

    /// Identity announced to clients, preferring what the backend reports.
    pub fn details(&self) -> ProviderDetails {
        let (name, description) = match &self.info {
            Some(info) => (
                non_empty_or(&info.name, &self.descriptor.name),
                non_empty_or(&info.description, &self.descriptor.description),
            ),
            None => (
                self.descriptor.name.clone(),
                self.descriptor.description.clone(),
            ),
        };
        ProviderDetails {
            name,
            description,
            service: self.descriptor.service.clone(),
            path: self.descriptor.path.clone(),
        }
    }

    /// Status as seen by clients.
    ///
    /// Providers that follow connectivity are `Unavailable` while offline
    /// and at most `Acquiring` while the connection is being established.
    pub fn status(&self) -> ProviderStatus {
        if self.descriptor.watches_connectivity() {
            if self.unreachable {
                return ProviderStatus::Unavailable;
            }
            match self.connectivity {
                ConnectivityStatus::Offline => return ProviderStatus::Unavailable,
                ConnectivityStatus::Acquiring => {
                    return self.backend_status.min(ProviderStatus::Acquiring)
                }
                ConnectivityStatus::Unknown | ConnectivityStatus::Online => {}
            }
        }
        self.backend_status
    }

    /// Current accuracy for `capability`.
    ///
    /// The accuracy of the cached value if there is one, `None` if the last
    /// fetch failed, and the declared accuracy if nothing was fetched yet.
    pub fn accuracy(&self, capability: Capability) -> Accuracy {
        let cached = match capability {
            Capability::Position => self.position.accuracy(),
            Capability::Address => self.address.accuracy(),
        };
        cached.unwrap_or_else(|| Accuracy::from_level(self.descriptor.accuracy))
    }

    /// Whether the descriptor satisfies `requirements` for `capability`.
    pub fn is_good_for(&self, capability: Capability, requirements: &Requirements) -> bool {
        let desc = &self.descriptor;
        desc.supports(capability)
            && (!requirements.require_updates || desc.provides_updates())
            && desc.accuracy >= requirements.min_accuracy
            && desc.requires.is_allowed_by(requirements.allowed_resources)
    }

    pub fn subscriber_count(&self, capability: Capability) -> usize {
        self.subscribers(capability).len()
    }

    pub fn is_subscribed(&self, client: ClientId, capability: Capability) -> bool {
        self.subscribers(capability).contains(&client)
    }

    pub fn has_subscribers(&self) -> bool {
        !self.position_subscribers.is_empty() || !self.address_subscribers.is_empty()
    }

    /// Whether reads are answered from the cache instead of the backend.
    pub fn reads_from_cache(&self) -> bool {
        self.descriptor.provides_updates() || self.descriptor.is_cacheable()
    }

    pub fn cached_position(&self) -> LocationResult<Position> {
        self.position.read()
    }

    pub fn cached_address(&self) -> LocationResult<Address> {
        self.address.read()
    }

    /// A direct fetch against the running backend, if reads go to the backend.
    pub fn fetch_request(&self, capability: Capability) -> Option<FetchRequest> {
        if self.reads_from_cache() || self.state != ConnectionState::Running {
            return None;
        }
        self.backend.as_ref().map(|backend| FetchRequest {
            provider: self.id,
            epoch: self.epoch,
            capability,
            backend: Arc::clone(backend),
        })
    }

    // =========================================================================
    // Subscription
    // =========================================================================

    /// Register `client` for `capability`.
    ///
    /// Returns true if this started a backend activation.
    pub(crate) fn subscribe(
        &mut self,
        client: ClientId,
        capability: Capability,
        out: &mut Outbox,
    ) -> bool {
        if self.subscribers_mut(capability).insert(client) {
            debug!(provider = %self.descriptor.name, client = %client, %capability, "Subscribed");
        }

        if self.descriptor.is_cacheable()
            || matches!(
                self.state,
                ConnectionState::Running | ConnectionState::Activating
            )
        {
            return false;
        }

        if self.descriptor.requires_network() && self.connectivity == ConnectivityStatus::Offline {
            debug!(provider = %self.descriptor.name, "Not activating while offline");
            return false;
        }

        self.activate(false, out);
        true
    }

    /// Remove `client` for `capability`, stopping the backend if the
    /// provider became idle and `policy` says so.
    pub(crate) fn unsubscribe(
        &mut self,
        client: ClientId,
        capability: Capability,
        policy: ShutdownPolicy,
        out: &mut Outbox,
    ) {
        if !self.subscribers_mut(capability).remove(&client) {
            return;
        }
        debug!(provider = %self.descriptor.name, client = %client, %capability, "Unsubscribed");

        if policy == ShutdownPolicy::StopWhenIdle
            && !self.has_subscribers()
            && !self.descriptor.is_cacheable()
            && matches!(
                self.state,
                ConnectionState::Running | ConnectionState::Activating
            )
        {
            info!(provider = %self.descriptor.name, "Stopping idle provider");
            self.stop(out);
        }
    }

    // =========================================================================
    // Inputs
    // =========================================================================

    /// Follow a connectivity change.
    pub(crate) fn set_connectivity(&mut self, status: ConnectivityStatus, out: &mut Outbox) {
        if !self.descriptor.watches_connectivity() || self.connectivity == status {
            return;
        }

        let before = self.observe();
        let was_online = self.connectivity.is_online();
        self.connectivity = status;

        if status.is_online() && !was_online {
            self.unreachable = false;
            if self.descriptor.is_cacheable() && self.state != ConnectionState::Activating {
                self.activate(true, out);
            }
        } else if was_online && !status.is_online() && self.descriptor.is_cacheable() {
            // Results only hold for the connection they were fetched on
            self.position.clear();
            self.address.clear();
        }

        self.publish_changes(before, out);
    }

    /// Apply a backend notification.
    pub(crate) fn handle_backend_event(
        &mut self,
        epoch: Epoch,
        event: BackendEvent,
        out: &mut Outbox,
    ) {
        if epoch != self.epoch || self.state != ConnectionState::Running {
            debug!(
                provider = %self.descriptor.name,
                epoch = epoch.0,
                current = self.epoch.0,
                "Ignoring stale backend event"
            );
            return;
        }

        let before = self.observe();
        match event {
            BackendEvent::StatusChanged(status) => self.backend_status = status,
            BackendEvent::PositionChanged(position) => self.store_position(Ok(position), out),
            BackendEvent::AddressChanged(address) => self.store_address(Ok(address), out),
            BackendEvent::ConnectionLost => {
                warn!(provider = %self.descriptor.name, "Backend connection lost");
                self.backend = None;
                self.epoch = self.epoch.next();
                self.state = ConnectionState::Stopped;
                self.backend_status = ProviderStatus::Error;
                self.position.clear();
                self.address.clear();
            }
        }
        self.publish_changes(before, out);
    }

    /// Complete an activation.
    pub(crate) fn handle_activated(
        &mut self,
        epoch: Epoch,
        outcome: Result<Activation, LocationError>,
        out: &mut Outbox,
    ) {
        if epoch != self.epoch || self.state != ConnectionState::Activating {
            debug!(provider = %self.descriptor.name, epoch = epoch.0, "Discarding stale activation");
            if let Ok(activation) = outcome {
                out.command(BackendCommand::Release {
                    provider: self.id,
                    backend: activation.backend,
                });
            }
            return;
        }

        let before = self.observe();
        match outcome {
            Ok(activation) => {
                self.info = Some(activation.info);
                self.backend_status = activation.status;

                // A one-shot fetch that outlived its connection is worthless
                if !self.once || self.connectivity.is_online() {
                    if let Some(result) = activation.position {
                        self.store_position(result, out);
                    }
                    if let Some(result) = activation.address {
                        self.store_address(result, out);
                    }
                }

                if self.once {
                    out.command(BackendCommand::Release {
                        provider: self.id,
                        backend: activation.backend,
                    });
                    self.epoch = self.epoch.next();
                    self.state = ConnectionState::Stopped;
                } else {
                    self.backend = Some(activation.backend);
                    self.state = ConnectionState::Running;
                }

                info!(
                    provider = %self.descriptor.name,
                    status = %self.backend_status,
                    once = self.once,
                    "Provider backend activated"
                );
            }
            Err(err) => {
                warn!(provider = %self.descriptor.name, error = %err, "Provider activation failed");
                self.state = ConnectionState::Stopped;
                self.backend_status = ProviderStatus::Error;
                if self.descriptor.is_cacheable() && err.is_unreachable() {
                    self.unreachable = true;
                }
            }
        }
        self.publish_changes(before, out);
    }

    /// Store the outcome of a direct fetch.
    pub(crate) fn handle_fetched(&mut self, epoch: Epoch, outcome: FetchOutcome, out: &mut Outbox) {
        if epoch != self.epoch || self.state != ConnectionState::Running {
            return;
        }
        let before = self.observe();
        match outcome {
            FetchOutcome::Position(result) => self.store_position(result, out),
            FetchOutcome::Address(result) => self.store_address(result, out),
        }
        self.publish_changes(before, out);
    }

    /// Forward options to the running backend.
    pub(crate) fn set_options(&self, options: &BackendOptions, out: &mut Outbox) {
        if self.state != ConnectionState::Running {
            return;
        }
        if let Some(backend) = &self.backend {
            out.command(BackendCommand::SetOptions {
                provider: self.id,
                backend: Arc::clone(backend),
                options: options.clone(),
            });
        }
    }

    /// Release the backend for good.
    pub(crate) fn shutdown(&mut self, out: &mut Outbox) {
        if let Some(backend) = self.backend.take() {
            out.command(BackendCommand::Release {
                provider: self.id,
                backend,
            });
        }
        self.epoch = self.epoch.next();
        self.state = ConnectionState::Stopped;
        self.backend_status = ProviderStatus::Unavailable;
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn activate(&mut self, once: bool, out: &mut Outbox) {
        let before = self.observe();
        self.epoch = self.epoch.next();
        self.state = ConnectionState::Activating;
        self.once = once;
        self.backend_status = ProviderStatus::Acquiring;

        info!(
            provider = %self.descriptor.name,
            epoch = self.epoch.0,
            once,
            "Activating provider backend"
        );
        out.command(BackendCommand::Activate {
            provider: self.id,
            epoch: self.epoch,
            descriptor: self.descriptor.clone(),
        });
        self.publish_changes(before, out);
    }

    fn stop(&mut self, out: &mut Outbox) {
        let before = self.observe();
        if let Some(backend) = self.backend.take() {
            out.command(BackendCommand::Release {
                provider: self.id,
                backend,
            });
        }
        self.epoch = self.epoch.next();
        self.state = ConnectionState::Stopped;
        self.backend_status = ProviderStatus::Unavailable;
        self.position.clear();
        self.address.clear();
        self.publish_changes(before, out);
    }

    fn store_position(&mut self, result: LocationResult<Position>, out: &mut Outbox) {
        self.note_unreachable(&result);
        if self.position.store(result) == Stored::Value {
            out.notify(ProviderNotice::PositionChanged { provider: self.id });
        }
    }

    fn store_address(&mut self, result: LocationResult<Address>, out: &mut Outbox) {
        self.note_unreachable(&result);
        if self.address.store(result) == Stored::Value {
            out.notify(ProviderNotice::AddressChanged { provider: self.id });
        }
    }

    fn note_unreachable<T>(&mut self, result: &LocationResult<T>) {
        if let Err(err) = result {
            if self.descriptor.is_cacheable() && err.is_unreachable() {
                warn!(provider = %self.descriptor.name, error = %err, "Provider service unreachable");
                self.unreachable = true;
            }
        }
    }

    fn observe(&self) -> Observed {
        Observed {
            status: self.status(),
            position: self.accuracy(Capability::Position),
            address: self.accuracy(Capability::Address),
        }
    }

    fn publish_changes(&self, before: Observed, out: &mut Outbox) {
        let after = self.observe();

        if before.status != after.status {
            info!(
                provider = %self.descriptor.name,
                old = %before.status,
                new = %after.status,
                "Provider status changed"
            );
            out.notify(ProviderNotice::StatusChanged {
                provider: self.id,
                old: before.status,
                new: after.status,
            });
        }

        for (capability, old, new) in [
            (Capability::Position, before.position, after.position),
            (Capability::Address, before.address, after.address),
        ] {
            if self.descriptor.supports(capability) && old.compare(&new) != Ordering::Equal {
                debug!(
                    provider = %self.descriptor.name,
                    %capability,
                    old = %old,
                    new = %new,
                    "Provider accuracy changed"
                );
                out.notify(ProviderNotice::AccuracyChanged {
                    provider: self.id,
                    capability,
                });
            }
        }
    }

    fn subscribers(&self, capability: Capability) -> &BTreeSet<ClientId> {
        match capability {
            Capability::Position => &self.position_subscribers,
            Capability::Address => &self.address_subscribers,
        }
    }

    fn subscribers_mut(&mut self, capability: Capability) -> &mut BTreeSet<ClientId> {
        match capability {
            Capability::Position => &mut self.position_subscribers,
            Capability::Address => &mut self.address_subscribers,
        }
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accuracy::AccuracyLevel;
    use crate::location::{Interfaces, Provides, Resources};
    use crate::master::testing;

    fn activation(status: ProviderStatus, position: Option<LocationResult<Position>>) -> Activation {
        let mut activation = testing::activation(status, position, None);
        activation.info = ProviderInfo::new("Reported", "");
        activation
    }

    fn gps() -> MasterProvider {
        MasterProvider::new(
            ProviderId(0),
            ProviderDescriptor::builder("Gps")
                .description("Satellite positioning")
                .accuracy(AccuracyLevel::Detailed)
                .requires(Resources::GPS)
                .provides(Provides::UPDATES)
                .interfaces(Interfaces::POSITION)
                .build(),
        )
    }

    fn web() -> MasterProvider {
        MasterProvider::new(
            ProviderId(1),
            ProviderDescriptor::builder("Web")
                .accuracy(AccuracyLevel::Locality)
                .requires(Resources::NETWORK)
                .interfaces(Interfaces::POSITION | Interfaces::ADDRESS)
                .build(),
        )
    }

    fn cacheable() -> MasterProvider {
        MasterProvider::new(
            ProviderId(2),
            ProviderDescriptor::builder("Hostip")
                .accuracy(AccuracyLevel::Locality)
                .requires(Resources::NETWORK)
                .provides(Provides::CACHEABLE_ON_CONNECTION)
                .interfaces(Interfaces::POSITION)
                .build(),
        )
    }

    fn fix() -> Position {
        Position::new_2d(60.0, 25.0, Accuracy::new(AccuracyLevel::Detailed, 8.0, 0.0))
    }

    fn run(provider: &mut MasterProvider, out: &mut Outbox) {
        let epoch = provider.epoch();
        provider.handle_activated(
            epoch,
            Ok(activation(ProviderStatus::Available, Some(Ok(fix())))),
            out,
        );
    }

    #[test]
    fn test_is_good_for() {
        let provider = gps();
        let req = Requirements::default();

        assert!(provider.is_good_for(Capability::Position, &req));
        assert!(!provider.is_good_for(Capability::Address, &req));
        assert!(!provider.is_good_for(
            Capability::Position,
            &req.clone().with_allowed_resources(Resources::NETWORK)
        ));
        assert!(provider.is_good_for(
            Capability::Position,
            &req.clone().with_require_updates(true)
        ));
        assert!(!web().is_good_for(Capability::Position, &req.clone().with_require_updates(true)));
        assert!(!web().is_good_for(
            Capability::Position,
            &req.with_min_accuracy(AccuracyLevel::Street)
        ));
    }

    #[test]
    fn test_first_subscribe_activates() {
        let mut provider = gps();
        let mut out = Outbox::default();

        assert!(provider.subscribe(ClientId(1), Capability::Position, &mut out));
        assert_eq!(provider.state(), ConnectionState::Activating);
        assert_eq!(provider.status(), ProviderStatus::Acquiring);
        assert!(matches!(
            out.commands.as_slice(),
            [BackendCommand::Activate { epoch: Epoch(1), .. }]
        ));
        assert!(out.notices.contains(&ProviderNotice::StatusChanged {
            provider: ProviderId(0),
            old: ProviderStatus::Unavailable,
            new: ProviderStatus::Acquiring,
        }));

        // Second subscriber does not activate again
        assert!(!provider.subscribe(ClientId(2), Capability::Position, &mut out));
        assert_eq!(provider.subscriber_count(Capability::Position), 2);
    }

    #[test]
    fn test_activation_populates_cache() {
        let mut provider = gps();
        let mut out = Outbox::default();
        provider.subscribe(ClientId(1), Capability::Position, &mut out);
        out.notices.clear();

        run(&mut provider, &mut out);

        assert_eq!(provider.state(), ConnectionState::Running);
        assert_eq!(provider.status(), ProviderStatus::Available);
        assert_eq!(provider.cached_position().unwrap().latitude, 60.0);
        assert_eq!(
            provider.accuracy(Capability::Position),
            Accuracy::new(AccuracyLevel::Detailed, 8.0, 0.0)
        );
        assert_eq!(provider.details().name, "Reported");
        assert!(out
            .notices
            .contains(&ProviderNotice::PositionChanged { provider: ProviderId(0) }));
    }

    #[test]
    fn test_failed_activation_is_error() {
        let mut provider = gps();
        let mut out = Outbox::default();
        provider.subscribe(ClientId(1), Capability::Position, &mut out);

        provider.handle_activated(
            Epoch(1),
            Err(LocationError::Failed("no device".into())),
            &mut out,
        );

        assert_eq!(provider.state(), ConnectionState::Stopped);
        assert_eq!(provider.status(), ProviderStatus::Error);
        // The next subscription retries
        assert!(provider.subscribe(ClientId(1), Capability::Position, &mut out));
    }

    #[test]
    fn test_stale_activation_is_released() {
        let mut provider = gps();
        let mut out = Outbox::default();
        provider.subscribe(ClientId(1), Capability::Position, &mut out);
        provider.unsubscribe(
            ClientId(1),
            Capability::Position,
            ShutdownPolicy::StopWhenIdle,
            &mut out,
        );
        out.commands.clear();

        provider.handle_activated(
            Epoch(1),
            Ok(activation(ProviderStatus::Available, None)),
            &mut out,
        );

        assert_eq!(provider.state(), ConnectionState::Stopped);
        assert!(matches!(
            out.commands.as_slice(),
            [BackendCommand::Release { .. }]
        ));
    }

    #[test]
    fn test_stale_backend_events_are_ignored() {
        let mut provider = gps();
        let mut out = Outbox::default();
        provider.subscribe(ClientId(1), Capability::Position, &mut out);
        run(&mut provider, &mut out);
        out.notices.clear();

        provider.handle_backend_event(
            Epoch(0),
            BackendEvent::StatusChanged(ProviderStatus::Error),
            &mut out,
        );
        assert_eq!(provider.status(), ProviderStatus::Available);
        assert!(out.notices.is_empty());

        provider.handle_backend_event(
            Epoch(1),
            BackendEvent::StatusChanged(ProviderStatus::Acquiring),
            &mut out,
        );
        assert_eq!(provider.status(), ProviderStatus::Acquiring);
        assert_eq!(out.notices.len(), 1);
    }

    #[test]
    fn test_duplicate_position_not_renotified() {
        let mut provider = gps();
        let mut out = Outbox::default();
        provider.subscribe(ClientId(1), Capability::Position, &mut out);
        run(&mut provider, &mut out);
        out.notices.clear();

        provider.handle_backend_event(Epoch(1), BackendEvent::PositionChanged(fix()), &mut out);
        assert!(out.notices.is_empty());

        let moved = Position::new_2d(60.5, 25.0, fix().accuracy);
        provider.handle_backend_event(Epoch(1), BackendEvent::PositionChanged(moved), &mut out);
        assert_eq!(
            out.notices.pop_front(),
            Some(ProviderNotice::PositionChanged { provider: ProviderId(0) })
        );
    }

    #[test]
    fn test_connection_lost_is_error() {
        let mut provider = gps();
        let mut out = Outbox::default();
        provider.subscribe(ClientId(1), Capability::Position, &mut out);
        run(&mut provider, &mut out);

        provider.handle_backend_event(Epoch(1), BackendEvent::ConnectionLost, &mut out);

        assert_eq!(provider.status(), ProviderStatus::Error);
        assert_eq!(provider.state(), ConnectionState::Stopped);
        assert!(provider.cached_position().is_err());
        assert_eq!(
            provider.accuracy(Capability::Position).level(),
            AccuracyLevel::Detailed
        );
    }

    #[test]
    fn test_idle_policy() {
        let mut provider = gps();
        let mut out = Outbox::default();
        provider.subscribe(ClientId(1), Capability::Position, &mut out);
        run(&mut provider, &mut out);

        provider.unsubscribe(
            ClientId(1),
            Capability::Position,
            ShutdownPolicy::KeepRunning,
            &mut out,
        );
        assert_eq!(provider.state(), ConnectionState::Running);

        provider.subscribe(ClientId(1), Capability::Position, &mut out);
        out.commands.clear();
        provider.unsubscribe(
            ClientId(1),
            Capability::Position,
            ShutdownPolicy::StopWhenIdle,
            &mut out,
        );
        assert_eq!(provider.state(), ConnectionState::Stopped);
        assert_eq!(provider.status(), ProviderStatus::Unavailable);
        assert!(matches!(
            out.commands.as_slice(),
            [BackendCommand::Release { .. }]
        ));
    }

    #[test]
    fn test_network_provider_offline_is_unavailable() {
        let mut provider = web();
        let mut out = Outbox::default();
        provider.subscribe(ClientId(1), Capability::Position, &mut out);
        run(&mut provider, &mut out);
        provider.set_connectivity(ConnectivityStatus::Online, &mut out);
        assert_eq!(provider.status(), ProviderStatus::Available);

        provider.set_connectivity(ConnectivityStatus::Acquiring, &mut out);
        assert_eq!(provider.status(), ProviderStatus::Acquiring);

        provider.set_connectivity(ConnectivityStatus::Offline, &mut out);
        assert_eq!(provider.status(), ProviderStatus::Unavailable);
        assert_eq!(provider.backend_status(), ProviderStatus::Available);
    }

    #[test]
    fn test_network_provider_not_activated_offline() {
        let mut provider = web();
        let mut out = Outbox::default();
        provider.set_connectivity(ConnectivityStatus::Offline, &mut out);

        assert!(!provider.subscribe(ClientId(1), Capability::Position, &mut out));
        assert_eq!(provider.state(), ConnectionState::Uninitialized);
    }

    #[test]
    fn test_gps_ignores_connectivity() {
        let mut provider = gps();
        let mut out = Outbox::default();
        provider.subscribe(ClientId(1), Capability::Position, &mut out);
        run(&mut provider, &mut out);

        provider.set_connectivity(ConnectivityStatus::Offline, &mut out);
        assert_eq!(provider.status(), ProviderStatus::Available);
    }

    #[test]
    fn test_cacheable_fetches_once_on_online() {
        let mut provider = cacheable();
        let mut out = Outbox::default();

        assert!(!provider.subscribe(ClientId(1), Capability::Position, &mut out));
        assert!(out.commands.is_empty());

        provider.set_connectivity(ConnectivityStatus::Online, &mut out);
        assert!(matches!(
            out.commands.as_slice(),
            [BackendCommand::Activate { .. }]
        ));
        out.commands.clear();

        run(&mut provider, &mut out);
        assert_eq!(provider.state(), ConnectionState::Stopped);
        assert_eq!(provider.status(), ProviderStatus::Available);
        assert!(provider.cached_position().is_ok());
        assert!(matches!(
            out.commands.as_slice(),
            [BackendCommand::Release { .. }]
        ));

        provider.set_connectivity(ConnectivityStatus::Offline, &mut out);
        assert_eq!(provider.status(), ProviderStatus::Unavailable);
        assert!(provider.cached_position().is_err());
    }

    #[test]
    fn test_cacheable_unreachable_until_next_online() {
        let mut provider = cacheable();
        let mut out = Outbox::default();
        provider.set_connectivity(ConnectivityStatus::Online, &mut out);

        provider.handle_activated(
            Epoch(1),
            Ok(activation(
                ProviderStatus::Available,
                Some(Err(LocationError::NotAvailable("timeout".into()))),
            )),
            &mut out,
        );
        assert_eq!(provider.status(), ProviderStatus::Unavailable);
        assert!(provider.cached_position().is_err());

        provider.set_connectivity(ConnectivityStatus::Offline, &mut out);
        provider.set_connectivity(ConnectivityStatus::Online, &mut out);
        assert_eq!(provider.status(), ProviderStatus::Acquiring);
    }

    #[test]
    fn test_fetch_request_only_for_direct_reads() {
        let mut provider = web();
        let mut out = Outbox::default();
        assert!(provider.fetch_request(Capability::Position).is_none());

        provider.subscribe(ClientId(1), Capability::Position, &mut out);
        run(&mut provider, &mut out);
        let request = provider.fetch_request(Capability::Position).unwrap();
        assert_eq!(request.epoch, Epoch(1));

        let mut gps = gps();
        gps.subscribe(ClientId(1), Capability::Position, &mut out);
        run(&mut gps, &mut out);
        assert!(gps.fetch_request(Capability::Position).is_none());
    }

    #[test]
    fn test_details_fall_back_to_manifest() {
        let provider = gps();
        let details = provider.details();
        assert_eq!(details.name, "Gps");
        assert_eq!(details.description, "Satellite positioning");
        assert_eq!(details.service, "org.geomaster.Provider.Gps");
    }
}
