//! Application sessions.
//!
//! A [`MasterClient`] keeps, per capability, the ranked list of candidate
//! providers matching its [`Requirements`] and the single active provider
//! it relays values from.
//!
//! # Selection
//!
//! Candidates are walked best first and subscribed. A subscription that
//! starts a backend re-ranks the list and restarts the walk. The first
//! `Available` candidate becomes active and every worse candidate is
//! unsubscribed. If nothing is available, candidates that are still coming
//! up stay subscribed so their completion can trigger a new selection.
//!
//! The first announcement of a capability waits until no candidate is
//! activating, so a session never sees a transient empty provider before
//! its first real one.

use std::collections::BTreeSet;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::cache::CachedValue;
use super::events::{ClientEvent, Outbox};
use super::ranking::{rank_candidates, RankKey};
use super::{
    ClientId, ConnectionState, MasterProvider, ProviderId, Registry, Requirements, ShutdownPolicy,
};
use crate::accuracy::Accuracy;
use crate::backend::BackendOptions;
use crate::error::{LocationError, LocationResult};
use crate::location::{Address, Capability, Position, ProviderStatus};

/// Mutable master state a client operates on.
pub(crate) struct Ctx<'a> {
    pub registry: &'a mut Registry,
    pub out: &'a mut Outbox,
    pub policy: ShutdownPolicy,
}

/// A value type relayed to applications.
pub(crate) trait Relayed: CachedValue {
    /// Value announced when no provider qualifies.
    fn empty() -> Self;

    fn into_event(self) -> ClientEvent;

    fn read(provider: &MasterProvider) -> LocationResult<Self>;
}

impl Relayed for Position {
    fn empty() -> Self {
        Position::empty()
    }

    fn into_event(self) -> ClientEvent {
        ClientEvent::PositionChanged(self)
    }

    fn read(provider: &MasterProvider) -> LocationResult<Self> {
        provider.cached_position()
    }
}

impl Relayed for Address {
    fn empty() -> Self {
        Address::empty()
    }

    fn into_event(self) -> ClientEvent {
        ClientEvent::AddressChanged(self)
    }

    fn read(provider: &MasterProvider) -> LocationResult<Self> {
        provider.cached_address()
    }
}

/// Client fields a slot needs while it is borrowed mutably.
struct Session<'a> {
    id: ClientId,
    events: &'a mpsc::UnboundedSender<ClientEvent>,
    requirements: &'a Requirements,
}

impl Session<'_> {
    fn send(&self, event: ClientEvent) {
        // A closed receiver means the application is disconnecting
        let _ = self.events.send(event);
    }
}

/// Per-capability selection state.
#[derive(Debug)]
struct Slot<T> {
    capability: Capability,
    started: bool,
    /// The first selection result has been announced.
    announced: bool,
    candidates: Vec<ProviderId>,
    active: Option<ProviderId>,
    last_emit: Option<Instant>,
    last_value: Option<T>,
}

impl<T: Relayed> Slot<T> {
    fn new(capability: Capability) -> Self {
        Self {
            capability,
            started: false,
            announced: false,
            candidates: Vec::new(),
            active: None,
            last_emit: None,
            last_value: None,
        }
    }

    /// Re-query candidates, unsubscribing from the ones no longer matching.
    fn refresh(&mut self, s: &Session, ctx: &mut Ctx) {
        let fresh = ctx.registry.get_candidates(self.capability, s.requirements);
        for id in self.candidates.iter().filter(|id| !fresh.contains(id)) {
            if let Some(provider) = ctx.registry.get_mut(*id) {
                provider.unsubscribe(s.id, self.capability, ctx.policy, ctx.out);
            }
        }
        debug!(
            client = %s.id,
            capability = %self.capability,
            count = fresh.len(),
            "Candidates refreshed"
        );
        self.candidates = fresh;
    }

    fn rank(&mut self, s: &Session, registry: &Registry) {
        let capability = self.capability;
        rank_candidates(&mut self.candidates, s.requirements.min_accuracy, |id| {
            match registry.get(id) {
                Some(p) => RankKey {
                    accuracy: p.accuracy(capability),
                    cost: p.descriptor().requires.cost(),
                },
                None => RankKey {
                    accuracy: Accuracy::NONE,
                    cost: u32::MAX,
                },
            }
        });
    }

    fn select(&mut self, s: &Session, ctx: &mut Ctx, now: Instant) {
        if !self.started {
            return;
        }
        let capability = self.capability;

        let chosen = 'walk: loop {
            self.rank(s, ctx.registry);
            for (index, id) in self.candidates.iter().enumerate() {
                let Some(provider) = ctx.registry.get_mut(*id) else {
                    continue;
                };
                if provider.subscribe(s.id, capability, ctx.out) {
                    continue 'walk;
                }
                if provider.status().is_available() {
                    break 'walk Some(index);
                }
            }
            break None;
        };

        let dropped: Vec<ProviderId> = match chosen {
            Some(index) => self.candidates[index + 1..].to_vec(),
            None => self
                .candidates
                .iter()
                .copied()
                .filter(|id| ctx.registry.get(*id).is_some_and(is_settled_unusable))
                .collect(),
        };
        for id in dropped {
            if let Some(provider) = ctx.registry.get_mut(id) {
                provider.unsubscribe(s.id, capability, ctx.policy, ctx.out);
            }
        }

        if chosen.is_none() && !self.announced && self.has_activating(ctx.registry) {
            debug!(
                client = %s.id,
                capability = %capability,
                "Selection waiting for activations"
            );
            return;
        }

        let active = chosen.map(|index| self.candidates[index]);
        self.set_active(active, s, ctx.registry, now);
    }

    /// Announce the outcome of a first selection once `provider` finished
    /// activating and nothing else is still coming up.
    fn on_activation_settled(
        &mut self,
        provider: ProviderId,
        s: &Session,
        ctx: &mut Ctx,
        now: Instant,
    ) {
        if !self.started
            || self.announced
            || !self.candidates.contains(&provider)
            || self.has_activating(ctx.registry)
        {
            return;
        }

        let any_available = self.candidates.iter().any(|id| {
            ctx.registry
                .get(*id)
                .is_some_and(|p| p.status().is_available())
        });
        if any_available {
            self.select(s, ctx, now);
            return;
        }

        let dropped: Vec<ProviderId> = self
            .candidates
            .iter()
            .copied()
            .filter(|id| ctx.registry.get(*id).is_some_and(is_settled_unusable))
            .collect();
        for id in dropped {
            if let Some(provider) = ctx.registry.get_mut(id) {
                provider.unsubscribe(s.id, self.capability, ctx.policy, ctx.out);
            }
        }
        self.set_active(None, s, ctx.registry, now);
    }

    fn has_activating(&self, registry: &Registry) -> bool {
        self.candidates.iter().any(|id| {
            registry
                .get(*id)
                .is_some_and(|p| p.state() == ConnectionState::Activating)
        })
    }

    fn set_active(
        &mut self,
        active: Option<ProviderId>,
        s: &Session,
        registry: &Registry,
        now: Instant,
    ) {
        if self.announced && self.active == active {
            return;
        }
        self.active = active;
        self.announced = true;

        let provider = active.and_then(|id| registry.get(id));
        let details = provider.map(MasterProvider::details);
        info!(
            client = %s.id,
            capability = %self.capability,
            provider = details.as_ref().map_or("none", |d| d.name.as_str()),
            "Active provider changed"
        );
        s.send(ClientEvent::ProviderChanged {
            capability: self.capability,
            provider: details,
        });

        match provider {
            Some(provider) => {
                if let Ok(value) = T::read(provider) {
                    self.relay(value, s, now, true);
                }
            }
            None => {
                self.last_value = None;
                s.send(T::empty().into_event());
            }
        }
    }

    /// Send `value` unless it repeats the last one or arrives within the
    /// minimum update interval. `force` skips both checks.
    fn relay(&mut self, value: T, s: &Session, now: Instant, force: bool) -> bool {
        if !force {
            if self
                .last_value
                .as_ref()
                .is_some_and(|last| last.same_value(&value))
            {
                return false;
            }
            if let Some(last) = self.last_emit {
                if now.duration_since(last) < s.requirements.min_update_interval {
                    debug!(client = %s.id, capability = %self.capability, "Update throttled");
                    return false;
                }
            }
        }

        self.last_emit = Some(now);
        self.last_value = Some(value.clone());
        s.send(value.into_event());
        true
    }

    fn on_status_changed(
        &mut self,
        provider: ProviderId,
        new: ProviderStatus,
        s: &Session,
        ctx: &mut Ctx,
        now: Instant,
    ) {
        if !self.started || !self.candidates.contains(&provider) {
            return;
        }
        self.rank(s, ctx.registry);

        let reselect = match self.active {
            None => new.is_available(),
            Some(active) if active == provider => !new.is_available(),
            Some(active) => new.is_available() && self.ranks_before(provider, active),
        };
        if reselect {
            self.select(s, ctx, now);
        }
    }

    fn on_accuracy_changed(
        &mut self,
        provider: ProviderId,
        s: &Session,
        ctx: &mut Ctx,
        now: Instant,
    ) {
        if !self.started || !self.candidates.contains(&provider) {
            return;
        }
        self.rank(s, ctx.registry);

        let best = self.candidates.iter().copied().find(|id| {
            ctx.registry
                .get(*id)
                .is_some_and(|p| p.status().is_available())
        });
        if best != self.active {
            self.select(s, ctx, now);
        }
    }

    fn on_value_changed(
        &mut self,
        provider: ProviderId,
        s: &Session,
        registry: &Registry,
        now: Instant,
    ) {
        if self.active != Some(provider) {
            return;
        }
        if let Some(value) = registry.get(provider).and_then(|p| T::read(p).ok()) {
            self.relay(value, s, now, false);
        }
    }

    fn release(&mut self, s: &Session, ctx: &mut Ctx) {
        for id in self.candidates.drain(..) {
            if let Some(provider) = ctx.registry.get_mut(id) {
                provider.unsubscribe(s.id, self.capability, ctx.policy, ctx.out);
            }
        }
        self.active = None;
    }

    fn ranks_before(&self, a: ProviderId, b: ProviderId) -> bool {
        let pos = |id| self.candidates.iter().position(|c| *c == id);
        matches!((pos(a), pos(b)), (Some(i), Some(j)) if i < j)
    }
}

fn is_settled_unusable(provider: &MasterProvider) -> bool {
    matches!(
        provider.status(),
        ProviderStatus::Error | ProviderStatus::Unavailable
    ) && provider.state() != ConnectionState::Activating
}

/// One application session.
pub struct MasterClient {
    id: ClientId,
    events: mpsc::UnboundedSender<ClientEvent>,
    requirements: Requirements,
    position: Slot<Position>,
    address: Slot<Address>,
}

impl MasterClient {
    pub(crate) fn new(id: ClientId, events: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self {
            id,
            events,
            requirements: Requirements::default(),
            position: Slot::new(Capability::Position),
            address: Slot::new(Capability::Address),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    pub fn is_started(&self, capability: Capability) -> bool {
        match capability {
            Capability::Position => self.position.started,
            Capability::Address => self.address.started,
        }
    }

    /// Active provider for `capability`.
    pub fn active(&self, capability: Capability) -> Option<ProviderId> {
        match capability {
            Capability::Position => self.position.active,
            Capability::Address => self.address.active,
        }
    }

    /// Candidates for `capability`, best first.
    pub fn candidates(&self, capability: Capability) -> &[ProviderId] {
        match capability {
            Capability::Position => &self.position.candidates,
            Capability::Address => &self.address.candidates,
        }
    }

    pub(crate) fn send(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    /// Store new requirements and re-select every started capability.
    pub(crate) fn set_requirements(
        &mut self,
        requirements: Requirements,
        ctx: &mut Ctx,
        now: Instant,
    ) {
        info!(
            client = %self.id,
            min_accuracy = %requirements.min_accuracy,
            min_update_interval_ms = requirements.min_update_interval.as_millis() as u64,
            require_updates = requirements.require_updates,
            allowed_resources = requirements.allowed_resources.bits(),
            "Requirements set"
        );
        self.requirements = requirements;

        for capability in Capability::ALL {
            if self.is_started(capability) {
                self.reselect(capability, true, ctx, now);
            }
        }
    }

    /// Start tracking `capability`.
    pub(crate) fn start(
        &mut self,
        capability: Capability,
        ctx: &mut Ctx,
        now: Instant,
    ) -> LocationResult<()> {
        if self.is_started(capability) {
            return Err(LocationError::RequirementsConflict(format!(
                "{} updates already started",
                capability
            )));
        }
        match capability {
            Capability::Position => self.position.started = true,
            Capability::Address => self.address.started = true,
        }
        info!(client = %self.id, %capability, "Capability started");
        self.reselect(capability, true, ctx, now);
        Ok(())
    }

    /// Run selection for `capability`, optionally re-querying candidates.
    pub(crate) fn reselect(
        &mut self,
        capability: Capability,
        refresh: bool,
        ctx: &mut Ctx,
        now: Instant,
    ) {
        let s = Session {
            id: self.id,
            events: &self.events,
            requirements: &self.requirements,
        };
        match capability {
            Capability::Position => {
                if refresh {
                    self.position.refresh(&s, ctx);
                }
                self.position.select(&s, ctx, now);
            }
            Capability::Address => {
                if refresh {
                    self.address.refresh(&s, ctx);
                }
                self.address.select(&s, ctx, now);
            }
        }
    }

    pub(crate) fn on_status_changed(
        &mut self,
        provider: ProviderId,
        new: ProviderStatus,
        ctx: &mut Ctx,
        now: Instant,
    ) {
        let s = Session {
            id: self.id,
            events: &self.events,
            requirements: &self.requirements,
        };
        self.position.on_status_changed(provider, new, &s, ctx, now);
        self.address.on_status_changed(provider, new, &s, ctx, now);
    }

    pub(crate) fn on_activation_settled(
        &mut self,
        provider: ProviderId,
        ctx: &mut Ctx,
        now: Instant,
    ) {
        let s = Session {
            id: self.id,
            events: &self.events,
            requirements: &self.requirements,
        };
        self.position.on_activation_settled(provider, &s, ctx, now);
        self.address.on_activation_settled(provider, &s, ctx, now);
    }

    pub(crate) fn on_accuracy_changed(
        &mut self,
        provider: ProviderId,
        capability: Capability,
        ctx: &mut Ctx,
        now: Instant,
    ) {
        let s = Session {
            id: self.id,
            events: &self.events,
            requirements: &self.requirements,
        };
        match capability {
            Capability::Position => self.position.on_accuracy_changed(provider, &s, ctx, now),
            Capability::Address => self.address.on_accuracy_changed(provider, &s, ctx, now),
        }
    }

    pub(crate) fn on_value_changed(
        &mut self,
        provider: ProviderId,
        capability: Capability,
        registry: &Registry,
        now: Instant,
    ) {
        let s = Session {
            id: self.id,
            events: &self.events,
            requirements: &self.requirements,
        };
        match capability {
            Capability::Position => self.position.on_value_changed(provider, &s, registry, now),
            Capability::Address => self.address.on_value_changed(provider, &s, registry, now),
        }
    }

    /// Forward options to every running candidate backend.
    pub(crate) fn set_options(
        &self,
        options: &BackendOptions,
        registry: &Registry,
        out: &mut Outbox,
    ) {
        let ids: BTreeSet<ProviderId> = self
            .position
            .candidates
            .iter()
            .chain(self.address.candidates.iter())
            .copied()
            .collect();
        for id in ids {
            if let Some(provider) = registry.get(id) {
                provider.set_options(options, out);
            }
        }
    }

    /// Unsubscribe from every candidate.
    pub(crate) fn release(&mut self, ctx: &mut Ctx) {
        let s = Session {
            id: self.id,
            events: &self.events,
            requirements: &self.requirements,
        };
        self.position.release(&s, ctx);
        self.address.release(&s, ctx);
        debug!(client = %self.id, "Client released");
    }
}
