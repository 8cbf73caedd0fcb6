//! Provider arbitration core.
//!
//! The [`Master`] owns every [`MasterProvider`] (one per loaded manifest) and
//! every [`MasterClient`] (one per application session). It is synchronous
//! and performs no I/O: inputs are method calls and [`MasterEvent`]s, outputs
//! are [`ClientEvent`]s sent to applications and [`BackendCommand`]s the
//! caller executes against backends.
//!
//! # Flow
//!
//! ```text
//! manifests ──► Registry ──► MasterProvider ◄── backend events
//!                                 │
//!                      ProviderNotice (FIFO)
//!                                 ▼
//!        application ──► MasterClient ──► ClientEvent
//! ```
//!
//! Provider changes are queued as [`ProviderNotice`]s and handed to clients
//! in order once the triggering operation finished, so a re-selection always
//! runs to completion before the next notice is looked at.

mod arbiter;
mod cache;
mod client;
mod events;
mod provider;
mod ranking;
mod registry;
#[cfg(test)]
mod testing;

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::accuracy::AccuracyLevel;
use crate::location::Resources;

pub use arbiter::{Lookup, Master, ProviderSnapshot};
pub use client::MasterClient;
pub use events::{
    Activation, BackendCommand, ClientEvent, FetchOutcome, FetchRequest, MasterEvent,
    ProviderDetails, ProviderNotice,
};
pub use provider::{ConnectionState, MasterProvider};
pub use ranking::{compare_rank, rank_candidates, RankKey};
pub use registry::Registry;

/// Index of a provider in the [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ProviderId(pub usize);

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider#{}", self.0)
    }
}

/// Identifier of an application session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// Generation counter of a provider's backend connection.
///
/// Bumped whenever a connection is started or torn down; events carrying
/// an older epoch are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Epoch(pub u64);

impl Epoch {
    pub fn next(self) -> Epoch {
        Epoch(self.0 + 1)
    }
}

/// What happens to a backend connection once nobody subscribes to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ShutdownPolicy {
    /// Release the backend when the last subscriber leaves.
    #[default]
    StopWhenIdle,
    /// Keep the backend running until the master shuts down.
    KeepRunning,
}

/// Configuration of the arbitration core.
#[derive(Debug, Clone, Default)]
pub struct MasterConfig {
    pub shutdown_policy: ShutdownPolicy,
}

impl MasterConfig {
    pub fn with_shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }
}

/// What an application asks of its providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirements {
    /// Minimum declared accuracy.
    pub min_accuracy: AccuracyLevel,
    /// Minimum time between two relayed value events; zero disables throttling.
    pub min_update_interval: Duration,
    /// Only consider providers that emit change notifications.
    pub require_updates: bool,
    /// Resources providers may use.
    pub allowed_resources: Resources,
}

impl Default for Requirements {
    fn default() -> Self {
        Self {
            min_accuracy: AccuracyLevel::None,
            min_update_interval: Duration::ZERO,
            require_updates: false,
            allowed_resources: Resources::all(),
        }
    }
}

impl Requirements {
    pub fn with_min_accuracy(mut self, level: AccuracyLevel) -> Self {
        self.min_accuracy = level;
        self
    }

    pub fn with_min_update_interval(mut self, interval: Duration) -> Self {
        self.min_update_interval = interval;
        self
    }

    pub fn with_require_updates(mut self, require: bool) -> Self {
        self.require_updates = require;
        self
    }

    pub fn with_allowed_resources(mut self, resources: Resources) -> Self {
        self.allowed_resources = resources;
        self
    }
}
