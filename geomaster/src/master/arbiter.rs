//! The arbitration root.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::client::Ctx;
use super::events::{BackendCommand, ClientEvent, FetchRequest, MasterEvent, Outbox, ProviderNotice};
use super::{
    ClientId, ConnectionState, MasterClient, MasterConfig, MasterProvider, ProviderId, Registry,
    Requirements,
};
use crate::accuracy::Accuracy;
use crate::backend::BackendOptions;
use crate::connectivity::ConnectivityStatus;
use crate::descriptor::DescriptorError;
use crate::error::{LocationError, LocationResult, MasterError};
use crate::location::{Address, Capability, Interfaces, Position, ProviderStatus, Provides, Resources};

/// Answer to a position/address query.
#[derive(Debug)]
pub enum Lookup<T> {
    /// Answered from the cache.
    Ready(LocationResult<T>),
    /// The backend must be asked directly.
    Fetch(FetchRequest),
}

/// Point-in-time view of one provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSnapshot {
    pub id: ProviderId,
    pub name: String,
    pub description: String,
    pub service: String,
    pub state: ConnectionState,
    pub status: ProviderStatus,
    pub backend_status: ProviderStatus,
    pub position_accuracy: Option<Accuracy>,
    pub address_accuracy: Option<Accuracy>,
    pub requires: Resources,
    pub provides: Provides,
    pub interfaces: Interfaces,
    pub subscribers: usize,
}

/// Registry of providers and factory of clients.
///
/// All state lives here and is mutated only through `&mut self`, so the
/// owner decides how inputs are serialized.
pub struct Master {
    registry: Registry,
    clients: BTreeMap<ClientId, MasterClient>,
    next_client: u64,
    config: MasterConfig,
    connectivity: ConnectivityStatus,
    outbox: Outbox,
    shut_down: bool,
}

impl Master {
    pub fn new(registry: Registry, config: MasterConfig) -> Self {
        info!(
            providers = registry.len(),
            policy = ?config.shutdown_policy,
            "Master created"
        );
        Self {
            registry,
            clients: BTreeMap::new(),
            next_client: 1,
            config,
            connectivity: ConnectivityStatus::Unknown,
            outbox: Outbox::default(),
            shut_down: false,
        }
    }

    /// Build a master from the manifests in `dir`.
    pub fn load_providers(dir: &Path, config: MasterConfig) -> Result<Self, DescriptorError> {
        Ok(Self::new(Registry::load(dir)?, config))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    pub fn connectivity(&self) -> ConnectivityStatus {
        self.connectivity
    }

    pub fn client(&self, id: ClientId) -> Option<&MasterClient> {
        self.clients.get(&id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    // =========================================================================
    // Application API
    // =========================================================================

    /// Create a session delivering its events to `events`.
    pub fn create_client(&mut self, events: mpsc::UnboundedSender<ClientEvent>) -> ClientId {
        let id = ClientId(self.next_client);
        self.next_client += 1;
        self.clients.insert(id, MasterClient::new(id, events));
        info!(client = %id, "Client created");
        id
    }

    /// Tear a session down, unsubscribing from every provider it held.
    pub fn remove_client(&mut self, id: ClientId) -> Result<(), MasterError> {
        let mut client = self
            .clients
            .remove(&id)
            .ok_or(MasterError::UnknownClient(id))?;
        let mut ctx = Ctx {
            registry: &mut self.registry,
            out: &mut self.outbox,
            policy: self.config.shutdown_policy,
        };
        client.release(&mut ctx);
        info!(client = %id, "Client removed");
        self.process_notices();
        Ok(())
    }

    pub fn set_requirements(
        &mut self,
        id: ClientId,
        requirements: Requirements,
    ) -> Result<(), MasterError> {
        let client = self
            .clients
            .get_mut(&id)
            .ok_or(MasterError::UnknownClient(id))?;
        let mut ctx = Ctx {
            registry: &mut self.registry,
            out: &mut self.outbox,
            policy: self.config.shutdown_policy,
        };
        client.set_requirements(requirements, &mut ctx, Instant::now());
        self.process_notices();
        Ok(())
    }

    /// Start tracking `capability` for a client.
    ///
    /// Fails with `RequirementsConflict` if it was already started.
    pub fn start(&mut self, id: ClientId, capability: Capability) -> Result<(), MasterError> {
        let client = self
            .clients
            .get_mut(&id)
            .ok_or(MasterError::UnknownClient(id))?;
        let mut ctx = Ctx {
            registry: &mut self.registry,
            out: &mut self.outbox,
            policy: self.config.shutdown_policy,
        };
        client.start(capability, &mut ctx, Instant::now())?;
        self.process_notices();
        Ok(())
    }

    pub fn position(&self, id: ClientId) -> Result<Lookup<Position>, MasterError> {
        let provider = match self.active_provider(id, Capability::Position)? {
            Some(provider) => provider,
            None => return Ok(Lookup::Ready(Err(LocationError::no_usable_provider()))),
        };
        Ok(match provider.fetch_request(Capability::Position) {
            Some(request) => Lookup::Fetch(request),
            None => Lookup::Ready(provider.cached_position()),
        })
    }

    pub fn address(&self, id: ClientId) -> Result<Lookup<Address>, MasterError> {
        let provider = match self.active_provider(id, Capability::Address)? {
            Some(provider) => provider,
            None => return Ok(Lookup::Ready(Err(LocationError::no_usable_provider()))),
        };
        Ok(match provider.fetch_request(Capability::Address) {
            Some(request) => Lookup::Fetch(request),
            None => Lookup::Ready(provider.cached_address()),
        })
    }

    /// Forward options to the running backends of a client's candidates.
    pub fn set_options(&mut self, id: ClientId, options: BackendOptions) -> Result<(), MasterError> {
        let client = self
            .clients
            .get(&id)
            .ok_or(MasterError::UnknownClient(id))?;
        client.set_options(&options, &self.registry, &mut self.outbox);
        Ok(())
    }

    // =========================================================================
    // Asynchronous inputs
    // =========================================================================

    pub fn handle_event(&mut self, event: MasterEvent) {
        let provider_id = match &event {
            MasterEvent::Backend { provider, .. }
            | MasterEvent::Activated { provider, .. }
            | MasterEvent::Fetched { provider, .. } => *provider,
        };
        let Some(provider) = self.registry.get_mut(provider_id) else {
            warn!(provider = %provider_id, "Event for unknown provider");
            return;
        };

        let activated = matches!(event, MasterEvent::Activated { .. });
        match event {
            MasterEvent::Backend { epoch, event, .. } => {
                provider.handle_backend_event(epoch, event, &mut self.outbox)
            }
            MasterEvent::Activated { epoch, outcome, .. } => {
                provider.handle_activated(epoch, outcome, &mut self.outbox)
            }
            MasterEvent::Fetched { epoch, outcome, .. } => {
                provider.handle_fetched(epoch, outcome, &mut self.outbox)
            }
        }
        self.process_notices();

        if activated {
            self.settle_activation(provider_id);
        }
    }

    /// Let sessions still waiting on their first selection announce it.
    fn settle_activation(&mut self, provider: ProviderId) {
        let now = Instant::now();
        let mut ctx = Ctx {
            registry: &mut self.registry,
            out: &mut self.outbox,
            policy: self.config.shutdown_policy,
        };
        for client in self.clients.values_mut() {
            client.on_activation_settled(provider, &mut ctx, now);
        }
        self.process_notices();
    }

    /// Follow a connectivity change.
    ///
    /// A transition into `Online` also re-runs selection for every started
    /// capability, giving providers skipped while offline another chance.
    pub fn set_connectivity(&mut self, status: ConnectivityStatus) {
        if status == self.connectivity {
            return;
        }
        info!(old = %self.connectivity, new = %status, "Connectivity changed");
        let came_online = status.is_online() && !self.connectivity.is_online();
        self.connectivity = status;

        for provider in self.registry.iter_mut() {
            provider.set_connectivity(status, &mut self.outbox);
        }
        self.process_notices();

        if came_online {
            let now = Instant::now();
            let mut ctx = Ctx {
                registry: &mut self.registry,
                out: &mut self.outbox,
                policy: self.config.shutdown_policy,
            };
            for client in self.clients.values_mut() {
                for capability in Capability::ALL {
                    if client.is_started(capability) {
                        client.reselect(capability, false, &mut ctx, now);
                    }
                }
            }
            self.process_notices();
        }
    }

    /// Backend work produced since the last call.
    pub fn take_commands(&mut self) -> Vec<BackendCommand> {
        std::mem::take(&mut self.outbox.commands)
    }

    /// Invalidate every client and release every backend.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        info!(clients = self.clients.len(), "Master shutting down");

        for client in self.clients.values() {
            client.send(ClientEvent::Invalidated);
        }
        for provider in self.registry.iter_mut() {
            provider.shutdown(&mut self.outbox);
        }
        self.outbox.notices.clear();
    }

    pub fn snapshot(&self) -> Vec<ProviderSnapshot> {
        self.registry
            .iter()
            .map(|p| {
                let desc = p.descriptor();
                ProviderSnapshot {
                    id: p.id(),
                    name: desc.name.clone(),
                    description: desc.description.clone(),
                    service: desc.service.clone(),
                    state: p.state(),
                    status: p.status(),
                    backend_status: p.backend_status(),
                    position_accuracy: desc
                        .supports(Capability::Position)
                        .then(|| p.accuracy(Capability::Position)),
                    address_accuracy: desc
                        .supports(Capability::Address)
                        .then(|| p.accuracy(Capability::Address)),
                    requires: desc.requires,
                    provides: desc.provides,
                    interfaces: desc.interfaces,
                    subscribers: p.subscriber_count(Capability::Position)
                        + p.subscriber_count(Capability::Address),
                }
            })
            .collect()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn active_provider(
        &self,
        id: ClientId,
        capability: Capability,
    ) -> Result<Option<&MasterProvider>, MasterError> {
        let client = self
            .clients
            .get(&id)
            .ok_or(MasterError::UnknownClient(id))?;
        Ok(client
            .active(capability)
            .and_then(|provider| self.registry.get(provider)))
    }

    /// Hand queued provider notices to clients, oldest first.
    fn process_notices(&mut self) {
        let now = Instant::now();
        let policy = self.config.shutdown_policy;

        while let Some(notice) = self.outbox.notices.pop_front() {
            debug!(?notice, "Processing provider notice");
            match notice {
                ProviderNotice::StatusChanged { provider, new, .. } => {
                    let mut ctx = Ctx {
                        registry: &mut self.registry,
                        out: &mut self.outbox,
                        policy,
                    };
                    for client in self.clients.values_mut() {
                        client.on_status_changed(provider, new, &mut ctx, now);
                    }
                }
                ProviderNotice::AccuracyChanged {
                    provider,
                    capability,
                } => {
                    let mut ctx = Ctx {
                        registry: &mut self.registry,
                        out: &mut self.outbox,
                        policy,
                    };
                    for client in self.clients.values_mut() {
                        client.on_accuracy_changed(provider, capability, &mut ctx, now);
                    }
                }
                ProviderNotice::PositionChanged { provider } => {
                    for client in self.clients.values_mut() {
                        client.on_value_changed(provider, Capability::Position, &self.registry, now);
                    }
                }
                ProviderNotice::AddressChanged { provider } => {
                    for client in self.clients.values_mut() {
                        client.on_value_changed(provider, Capability::Address, &self.registry, now);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accuracy::AccuracyLevel;
    use crate::backend::BackendEvent;
    use crate::descriptor::ProviderDescriptor;
    use crate::master::testing::activation;
    use crate::master::{FetchOutcome, ShutdownPolicy};

    type Events = mpsc::UnboundedReceiver<ClientEvent>;

    fn provider(
        name: &str,
        accuracy: AccuracyLevel,
        requires: Resources,
        provides: Provides,
        interfaces: Interfaces,
    ) -> ProviderDescriptor {
        ProviderDescriptor::builder(name)
            .accuracy(accuracy)
            .requires(requires)
            .provides(provides)
            .interfaces(interfaces)
            .build()
    }

    fn fix(level: AccuracyLevel, h: f64) -> Position {
        Position::new_2d(60.0, 25.0, Accuracy::new(level, h, 0.0))
    }

    fn master(descriptors: Vec<ProviderDescriptor>, policy: ShutdownPolicy) -> Master {
        Master::new(
            Registry::from_descriptors(descriptors),
            MasterConfig::default().with_shutdown_policy(policy),
        )
    }

    fn client(master: &mut Master) -> (ClientId, Events) {
        let (tx, rx) = mpsc::unbounded_channel();
        (master.create_client(tx), rx)
    }

    /// Complete every pending activation. Each provider reports `Available`
    /// and a fix at its declared accuracy unless `script` says otherwise.
    fn complete<F>(master: &mut Master, script: F) -> usize
    where
        F: Fn(&ProviderDescriptor) -> Option<(ProviderStatus, Position)>,
    {
        let mut activated = 0;
        loop {
            let pending: Vec<_> = master
                .take_commands()
                .into_iter()
                .filter_map(|cmd| match cmd {
                    BackendCommand::Activate {
                        provider,
                        epoch,
                        descriptor,
                    } => Some((provider, epoch, descriptor)),
                    _ => None,
                })
                .collect();
            if pending.is_empty() {
                return activated;
            }
            for (provider, epoch, descriptor) in pending {
                let outcome = match script(&descriptor) {
                    Some((status, position)) => Ok(activation(
                        status,
                        descriptor
                            .supports(Capability::Position)
                            .then(|| Ok(position)),
                        descriptor
                            .supports(Capability::Address)
                            .then(|| Ok(Address::empty())),
                    )),
                    None => Err(LocationError::Failed("no backend".into())),
                };
                master.handle_event(MasterEvent::Activated {
                    provider,
                    epoch,
                    outcome,
                });
                activated += 1;
            }
        }
    }

    fn available(desc: &ProviderDescriptor) -> Option<(ProviderStatus, Position)> {
        Some((ProviderStatus::Available, fix(desc.accuracy, 10.0)))
    }

    fn drain(rx: &mut Events) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn provider_changes(events: &[ClientEvent]) -> Vec<Option<String>> {
        events
            .iter()
            .filter_map(|e| match e {
                ClientEvent::ProviderChanged { provider, .. } => {
                    Some(provider.as_ref().map(|p| p.name.clone()))
                }
                _ => None,
            })
            .collect()
    }

    fn active_name(master: &Master, id: ClientId, capability: Capability) -> Option<String> {
        master
            .client(id)
            .and_then(|c| c.active(capability))
            .and_then(|p| master.registry().get(p))
            .map(|p| p.name().to_string())
    }

    fn two_position_providers() -> Vec<ProviderDescriptor> {
        vec![
            provider(
                "A",
                AccuracyLevel::Locality,
                Resources::NETWORK,
                Provides::empty(),
                Interfaces::POSITION,
            ),
            provider(
                "B",
                AccuracyLevel::Detailed,
                Resources::empty(),
                Provides::UPDATES,
                Interfaces::POSITION,
            ),
        ]
    }

    #[test]
    fn test_cheapest_qualifying_provider_selected() {
        let mut master = master(two_position_providers(), ShutdownPolicy::StopWhenIdle);
        master.set_connectivity(ConnectivityStatus::Online);
        let (id, mut rx) = client(&mut master);

        master
            .set_requirements(
                id,
                Requirements::default()
                    .with_min_accuracy(AccuracyLevel::Country)
                    .with_allowed_resources(Resources::GPS | Resources::NETWORK),
            )
            .unwrap();
        master.start(id, Capability::Position).unwrap();
        complete(&mut master, available);

        assert_eq!(active_name(&master, id, Capability::Position).as_deref(), Some("B"));
        let events = drain(&mut rx);
        assert_eq!(provider_changes(&events).last(), Some(&Some("B".to_string())));
        assert!(matches!(events.last(), Some(ClientEvent::PositionChanged(p)) if p.latitude == 60.0));

        // The loser was released once idle
        let a = master.registry().find("A").unwrap();
        assert_eq!(a.state(), ConnectionState::Stopped);
    }

    #[test]
    fn test_offline_does_not_disturb_non_network_provider() {
        let mut master = master(two_position_providers(), ShutdownPolicy::StopWhenIdle);
        master.set_connectivity(ConnectivityStatus::Online);
        let (id, mut rx) = client(&mut master);
        master.start(id, Capability::Position).unwrap();
        complete(&mut master, available);
        drain(&mut rx);

        master.set_connectivity(ConnectivityStatus::Offline);

        let a = master.registry().find("A").unwrap();
        assert_eq!(a.status(), ProviderStatus::Unavailable);
        assert_eq!(active_name(&master, id, Capability::Position).as_deref(), Some("B"));
        assert!(provider_changes(&drain(&mut rx)).is_empty());
    }

    #[test]
    fn test_offline_fails_over_from_network_provider() {
        let descriptors = vec![
            provider(
                "Gps",
                AccuracyLevel::Detailed,
                Resources::GPS,
                Provides::UPDATES,
                Interfaces::POSITION,
            ),
            provider(
                "Web",
                AccuracyLevel::Locality,
                Resources::NETWORK,
                Provides::UPDATES,
                Interfaces::POSITION,
            ),
        ];
        let mut master = master(descriptors, ShutdownPolicy::StopWhenIdle);
        master.set_connectivity(ConnectivityStatus::Online);
        let (id, mut rx) = client(&mut master);
        master.start(id, Capability::Position).unwrap();
        complete(&mut master, available);
        assert_eq!(active_name(&master, id, Capability::Position).as_deref(), Some("Web"));
        drain(&mut rx);

        master.set_connectivity(ConnectivityStatus::Offline);
        complete(&mut master, available);

        assert_eq!(active_name(&master, id, Capability::Position).as_deref(), Some("Gps"));
        assert_eq!(
            provider_changes(&drain(&mut rx)),
            vec![None, Some("Gps".to_string())]
        );

        // Back online the cheaper provider wins again
        master.set_connectivity(ConnectivityStatus::Online);
        complete(&mut master, available);
        assert_eq!(active_name(&master, id, Capability::Position).as_deref(), Some("Web"));
    }

    #[test]
    fn test_cacheable_provider_fetches_on_online_without_subscribers() {
        let mut master = master(
            vec![provider(
                "Hostip",
                AccuracyLevel::Locality,
                Resources::NETWORK,
                Provides::CACHEABLE_ON_CONNECTION,
                Interfaces::ADDRESS,
            )],
            ShutdownPolicy::StopWhenIdle,
        );
        master.set_connectivity(ConnectivityStatus::Offline);
        assert!(master.take_commands().is_empty());

        master.set_connectivity(ConnectivityStatus::Online);
        let commands = master.take_commands();
        assert_eq!(commands.len(), 1);
        let BackendCommand::Activate {
            provider, epoch, ..
        } = &commands[0]
        else {
            panic!("expected activation, got {:?}", commands[0]);
        };

        let mut details = BTreeMap::new();
        details.insert("locality".to_string(), "Helsinki".to_string());
        master.handle_event(MasterEvent::Activated {
            provider: *provider,
            epoch: *epoch,
            outcome: Ok(activation(
                ProviderStatus::Available,
                None,
                Some(Ok(Address::new(
                    details,
                    Accuracy::from_level(AccuracyLevel::Locality),
                ))),
            )),
        });

        let hostip = master.registry().find("Hostip").unwrap();
        assert_eq!(hostip.status(), ProviderStatus::Available);
        assert_eq!(hostip.state(), ConnectionState::Stopped);
        assert_eq!(
            hostip.cached_address().unwrap().get("locality"),
            Some("Helsinki")
        );
        assert!(matches!(
            master.take_commands().as_slice(),
            [BackendCommand::Release { .. }]
        ));
    }

    #[test]
    fn test_last_requirements_before_start_win() {
        let mut master = master(two_position_providers(), ShutdownPolicy::StopWhenIdle);
        let (id, _rx) = client(&mut master);

        master
            .set_requirements(id, Requirements::default().with_min_accuracy(AccuracyLevel::Street))
            .unwrap();
        master
            .set_requirements(id, Requirements::default().with_min_accuracy(AccuracyLevel::Country))
            .unwrap();
        assert!(master.take_commands().is_empty());

        master.start(id, Capability::Position).unwrap();

        let candidates = master.client(id).unwrap().candidates(Capability::Position);
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_start_twice_conflicts() {
        let mut master = master(two_position_providers(), ShutdownPolicy::StopWhenIdle);
        let (id, _rx) = client(&mut master);

        master.start(id, Capability::Position).unwrap();
        assert!(matches!(
            master.start(id, Capability::Position),
            Err(MasterError::Location(LocationError::RequirementsConflict(_)))
        ));
        assert!(master.start(id, Capability::Address).is_ok());
    }

    #[test]
    fn test_unknown_client() {
        let mut master = master(Vec::new(), ShutdownPolicy::StopWhenIdle);
        assert!(matches!(
            master.start(ClientId(42), Capability::Position),
            Err(MasterError::UnknownClient(ClientId(42)))
        ));
        assert!(matches!(
            master.remove_client(ClientId(42)),
            Err(MasterError::UnknownClient(_))
        ));
    }

    #[test]
    fn test_no_candidates_announces_empty_provider_once() {
        let mut master = master(two_position_providers(), ShutdownPolicy::StopWhenIdle);
        let (id, mut rx) = client(&mut master);

        master.start(id, Capability::Address).unwrap();
        master.set_connectivity(ConnectivityStatus::Online);

        let events = drain(&mut rx);
        assert_eq!(provider_changes(&events), vec![None]);
        assert!(matches!(
            events.get(1),
            Some(ClientEvent::AddressChanged(a)) if a.accuracy.level() == AccuracyLevel::None
        ));
        assert!(matches!(
            master.position(id).unwrap(),
            Lookup::Ready(Err(LocationError::NotAvailable(_)))
        ));
    }

    #[test]
    fn test_connection_lost_fails_over() {
        let mut master = master(two_position_providers(), ShutdownPolicy::KeepRunning);
        master.set_connectivity(ConnectivityStatus::Online);
        let (id, mut rx) = client(&mut master);
        master.start(id, Capability::Position).unwrap();
        complete(&mut master, available);
        assert_eq!(active_name(&master, id, Capability::Position).as_deref(), Some("B"));
        drain(&mut rx);

        let b = master.registry().find("B").unwrap();
        let (b_id, b_epoch) = (b.id(), b.epoch());
        master.handle_event(MasterEvent::Backend {
            provider: b_id,
            epoch: b_epoch,
            event: BackendEvent::ConnectionLost,
        });

        // A kept running under KeepRunning and takes over immediately
        assert_eq!(active_name(&master, id, Capability::Position).as_deref(), Some("A"));
        assert_eq!(
            provider_changes(&drain(&mut rx)),
            vec![Some("A".to_string())]
        );
    }

    #[test]
    fn test_accuracy_change_reorders() {
        let descriptors = vec![
            provider(
                "P0",
                AccuracyLevel::Detailed,
                Resources::empty(),
                Provides::UPDATES,
                Interfaces::POSITION,
            ),
            provider(
                "P1",
                AccuracyLevel::Detailed,
                Resources::empty(),
                Provides::UPDATES,
                Interfaces::POSITION,
            ),
        ];
        let mut master = master(descriptors, ShutdownPolicy::KeepRunning);
        let (id, _rx) = client(&mut master);
        master.start(id, Capability::Position).unwrap();
        complete(&mut master, |desc| {
            let h = if desc.name == "P0" { 100.0 } else { 10.0 };
            Some((ProviderStatus::Available, fix(AccuracyLevel::Detailed, h)))
        });
        assert_eq!(active_name(&master, id, Capability::Position).as_deref(), Some("P1"));

        let p0 = master.registry().find("P0").unwrap();
        let (p0_id, p0_epoch) = (p0.id(), p0.epoch());
        master.handle_event(MasterEvent::Backend {
            provider: p0_id,
            epoch: p0_epoch,
            event: BackendEvent::PositionChanged(fix(AccuracyLevel::Detailed, 5.0)),
        });

        assert_eq!(active_name(&master, id, Capability::Position).as_deref(), Some("P0"));
    }

    #[test]
    fn test_value_updates_relayed_from_active_only() {
        let mut master = master(two_position_providers(), ShutdownPolicy::KeepRunning);
        master.set_connectivity(ConnectivityStatus::Online);
        let (id, mut rx) = client(&mut master);
        master.start(id, Capability::Position).unwrap();
        complete(&mut master, available);
        drain(&mut rx);

        let a = master.registry().find("A").unwrap();
        let (a_id, a_epoch) = (a.id(), a.epoch());
        master.handle_event(MasterEvent::Backend {
            provider: a_id,
            epoch: a_epoch,
            event: BackendEvent::PositionChanged(Position::new_2d(
                1.0,
                1.0,
                Accuracy::from_level(AccuracyLevel::Locality),
            )),
        });
        assert!(drain(&mut rx).is_empty());

        let b = master.registry().find("B").unwrap();
        let (b_id, b_epoch) = (b.id(), b.epoch());
        let moved = Position::new_2d(61.0, 25.0, Accuracy::new(AccuracyLevel::Detailed, 10.0, 0.0));
        master.handle_event(MasterEvent::Backend {
            provider: b_id,
            epoch: b_epoch,
            event: BackendEvent::PositionChanged(moved.clone()),
        });
        // Same fix again is not repeated
        master.handle_event(MasterEvent::Backend {
            provider: b_id,
            epoch: b_epoch,
            event: BackendEvent::PositionChanged(moved),
        });

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ClientEvent::PositionChanged(p) if p.latitude == 61.0));
    }

    #[test]
    fn test_lookup_fetches_from_backend_without_updates() {
        let descriptors = vec![provider(
            "Web",
            AccuracyLevel::Locality,
            Resources::empty(),
            Provides::empty(),
            Interfaces::POSITION,
        )];
        let mut master = master(descriptors, ShutdownPolicy::StopWhenIdle);
        let (id, _rx) = client(&mut master);
        master.start(id, Capability::Position).unwrap();
        complete(&mut master, available);

        let Lookup::Fetch(request) = master.position(id).unwrap() else {
            panic!("expected a direct fetch");
        };
        assert_eq!(request.capability, Capability::Position);

        let fresh = Position::new_2d(1.0, 2.0, Accuracy::from_level(AccuracyLevel::Locality));
        master.handle_event(MasterEvent::Fetched {
            provider: request.provider,
            epoch: request.epoch,
            outcome: FetchOutcome::Position(Ok(fresh)),
        });
        let web = master.registry().find("Web").unwrap();
        assert_eq!(web.cached_position().unwrap().latitude, 1.0);
    }

    #[test]
    fn test_lookup_reads_cache_with_updates() {
        let mut master = master(two_position_providers(), ShutdownPolicy::StopWhenIdle);
        master.set_connectivity(ConnectivityStatus::Online);
        let (id, _rx) = client(&mut master);
        master.start(id, Capability::Position).unwrap();
        complete(&mut master, available);

        assert!(matches!(
            master.position(id).unwrap(),
            Lookup::Ready(Ok(p)) if p.accuracy.level() == AccuracyLevel::Detailed
        ));
    }

    #[test]
    fn test_remove_client_stops_idle_providers() {
        let mut master = master(two_position_providers(), ShutdownPolicy::StopWhenIdle);
        let (id, _rx) = client(&mut master);
        master.start(id, Capability::Position).unwrap();
        complete(&mut master, available);

        master.remove_client(id).unwrap();

        assert_eq!(master.client_count(), 0);
        for provider in master.registry().iter() {
            assert!(!provider.has_subscribers());
            assert_ne!(provider.state(), ConnectionState::Running);
        }
        assert!(master
            .take_commands()
            .iter()
            .any(|c| matches!(c, BackendCommand::Release { .. })));
    }

    #[test]
    fn test_set_options_reaches_running_candidates() {
        let mut master = master(two_position_providers(), ShutdownPolicy::KeepRunning);
        master.set_connectivity(ConnectivityStatus::Online);
        let (id, _rx) = client(&mut master);
        master.start(id, Capability::Position).unwrap();
        complete(&mut master, available);

        let mut options = BackendOptions::new();
        options.insert("interval".to_string(), "5".to_string());
        master.set_options(id, options).unwrap();

        let forwarded = master
            .take_commands()
            .into_iter()
            .filter(|c| matches!(c, BackendCommand::SetOptions { .. }))
            .count();
        assert_eq!(forwarded, 2);
    }

    #[test]
    fn test_shutdown_invalidates_and_releases() {
        let mut master = master(two_position_providers(), ShutdownPolicy::KeepRunning);
        master.set_connectivity(ConnectivityStatus::Online);
        let (id, mut rx) = client(&mut master);
        master.start(id, Capability::Position).unwrap();
        complete(&mut master, available);
        drain(&mut rx);

        master.shutdown();

        assert_eq!(drain(&mut rx), vec![ClientEvent::Invalidated]);
        let released = master
            .take_commands()
            .into_iter()
            .filter(|c| matches!(c, BackendCommand::Release { .. }))
            .count();
        assert_eq!(released, 2);
    }

    #[test]
    fn test_first_announcement_waits_for_activation() {
        let mut master = master(
            vec![provider(
                "B",
                AccuracyLevel::Detailed,
                Resources::empty(),
                Provides::UPDATES,
                Interfaces::POSITION,
            )],
            ShutdownPolicy::StopWhenIdle,
        );
        let (id, mut rx) = client(&mut master);
        master.start(id, Capability::Position).unwrap();

        // Nothing is announced while the only candidate is coming up
        assert!(drain(&mut rx).is_empty());

        complete(&mut master, available);

        let events = drain(&mut rx);
        assert_eq!(provider_changes(&events), vec![Some("B".to_string())]);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1],
            ClientEvent::PositionChanged(p) if p.accuracy.level() == AccuracyLevel::Detailed
        ));
    }

    #[test]
    fn test_unavailable_after_activation_announces_empty_provider() {
        let mut master = master(
            vec![provider(
                "B",
                AccuracyLevel::Detailed,
                Resources::empty(),
                Provides::UPDATES,
                Interfaces::POSITION,
            )],
            ShutdownPolicy::KeepRunning,
        );
        let (id, mut rx) = client(&mut master);
        master.start(id, Capability::Position).unwrap();

        // Activation succeeds without a status change
        complete(&mut master, |desc| {
            Some((ProviderStatus::Unavailable, fix(desc.accuracy, 10.0)))
        });

        assert_eq!(provider_changes(&drain(&mut rx)), vec![None]);
        assert_eq!(master.client(id).unwrap().active(Capability::Position), None);
    }

    #[test]
    fn test_failed_activation_leaves_no_provider() {
        let mut master = master(two_position_providers(), ShutdownPolicy::StopWhenIdle);
        master.set_connectivity(ConnectivityStatus::Online);
        let (id, mut rx) = client(&mut master);
        master.start(id, Capability::Position).unwrap();
        let activated = complete(&mut master, |_| None);

        assert_eq!(activated, 2);
        assert_eq!(master.client(id).unwrap().active(Capability::Position), None);
        assert_eq!(provider_changes(&drain(&mut rx)), vec![None]);
        assert!(master.snapshot().iter().all(|s| s.status == ProviderStatus::Error));
    }

    #[test]
    fn test_snapshot() {
        let master = master(two_position_providers(), ShutdownPolicy::StopWhenIdle);
        let snapshot = master.snapshot();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].name, "A");
        assert_eq!(snapshot[0].state, ConnectionState::Uninitialized);
        assert_eq!(snapshot[0].address_accuracy, None);
        assert_eq!(
            snapshot[1].position_accuracy.map(|a| a.level()),
            Some(AccuracyLevel::Detailed)
        );
        assert_eq!(snapshot[1].subscribers, 0);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json[0]["name"], "A");
        assert_eq!(json[0]["state"], "Uninitialized");
        assert!(json[0]["address_accuracy"].is_null());
    }
}
