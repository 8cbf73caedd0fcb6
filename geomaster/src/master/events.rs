//! Messages flowing into and out of the arbitration core.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::{Epoch, ProviderId};
use crate::backend::{BackendEvent, BackendOptions, LocationBackend};
use crate::descriptor::ProviderDescriptor;
use crate::error::{LocationError, LocationResult};
use crate::location::{Address, Capability, Position, ProviderInfo, ProviderStatus};

// =============================================================================
// Inbound
// =============================================================================

/// Asynchronous input to the master.
#[derive(Debug)]
pub enum MasterEvent {
    /// A backend notification.
    Backend {
        provider: ProviderId,
        epoch: Epoch,
        event: BackendEvent,
    },

    /// A backend activation finished.
    Activated {
        provider: ProviderId,
        epoch: Epoch,
        outcome: Result<Activation, LocationError>,
    },

    /// A direct fetch finished.
    Fetched {
        provider: ProviderId,
        epoch: Epoch,
        outcome: FetchOutcome,
    },
}

/// Result of connecting a backend and reading its initial state.
pub struct Activation {
    pub backend: Arc<dyn LocationBackend>,
    pub info: ProviderInfo,
    pub status: ProviderStatus,
    /// Initial position fetch, if the provider implements position.
    pub position: Option<LocationResult<Position>>,
    /// Initial address fetch, if the provider implements address.
    pub address: Option<LocationResult<Address>>,
}

impl fmt::Debug for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activation")
            .field("info", &self.info)
            .field("status", &self.status)
            .field("position", &self.position)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Result of a direct backend fetch.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Position(LocationResult<Position>),
    Address(LocationResult<Address>),
}

// =============================================================================
// Outbound
// =============================================================================

/// Work the caller must perform against backends.
pub enum BackendCommand {
    /// Connect the provider's backend and report [`MasterEvent::Activated`].
    Activate {
        provider: ProviderId,
        epoch: Epoch,
        descriptor: ProviderDescriptor,
    },

    /// Drop the master's reference on a backend.
    Release {
        provider: ProviderId,
        backend: Arc<dyn LocationBackend>,
    },

    /// Forward client options to a running backend.
    SetOptions {
        provider: ProviderId,
        backend: Arc<dyn LocationBackend>,
        options: BackendOptions,
    },
}

impl BackendCommand {
    /// Provider the command concerns.
    pub fn provider(&self) -> ProviderId {
        match self {
            BackendCommand::Activate { provider, .. }
            | BackendCommand::Release { provider, .. }
            | BackendCommand::SetOptions { provider, .. } => *provider,
        }
    }
}

impl fmt::Debug for BackendCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendCommand::Activate {
                provider, epoch, ..
            } => f
                .debug_struct("Activate")
                .field("provider", provider)
                .field("epoch", epoch)
                .finish_non_exhaustive(),
            BackendCommand::Release { provider, .. } => f
                .debug_struct("Release")
                .field("provider", provider)
                .finish_non_exhaustive(),
            BackendCommand::SetOptions {
                provider, options, ..
            } => f
                .debug_struct("SetOptions")
                .field("provider", provider)
                .field("options", options)
                .finish_non_exhaustive(),
        }
    }
}

/// A direct fetch the caller must perform.
///
/// The outcome is answered to the requester and posted back as
/// [`MasterEvent::Fetched`] so the provider cache follows it.
#[derive(Clone)]
pub struct FetchRequest {
    pub provider: ProviderId,
    pub epoch: Epoch,
    pub capability: Capability,
    pub backend: Arc<dyn LocationBackend>,
}

impl fmt::Debug for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchRequest")
            .field("provider", &self.provider)
            .field("epoch", &self.epoch)
            .field("capability", &self.capability)
            .finish_non_exhaustive()
    }
}

/// Identity of a selected provider as announced to applications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderDetails {
    pub name: String,
    pub description: String,
    pub service: String,
    pub path: String,
}

/// Event delivered to an application session.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The active provider for a capability changed. `None` means no
    /// provider qualifies.
    ProviderChanged {
        capability: Capability,
        provider: Option<ProviderDetails>,
    },
    PositionChanged(Position),
    AddressChanged(Address),
    /// The master is going away; the session is no longer valid.
    Invalidated,
}

/// Provider change queued for clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderNotice {
    StatusChanged {
        provider: ProviderId,
        old: ProviderStatus,
        new: ProviderStatus,
    },
    AccuracyChanged {
        provider: ProviderId,
        capability: Capability,
    },
    PositionChanged {
        provider: ProviderId,
    },
    AddressChanged {
        provider: ProviderId,
    },
}

/// Output accumulated while the master handles one input.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    pub notices: VecDeque<ProviderNotice>,
    pub commands: Vec<BackendCommand>,
}

impl Outbox {
    pub fn notify(&mut self, notice: ProviderNotice) {
        self.notices.push_back(notice);
    }

    pub fn command(&mut self, command: BackendCommand) {
        self.commands.push(command);
    }
}
