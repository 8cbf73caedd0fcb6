//! Core location types shared by providers, the master and applications.
//!
//! - [`ProviderStatus`] - Backend availability as reported to clients
//! - [`Capability`] - The capabilities the master arbitrates (position, address)
//! - [`Interfaces`], [`Resources`], [`Provides`] - Manifest flag sets
//! - [`Position`], [`Address`] - Provider results
//! - [`ProviderInfo`] - Name and description reported by a backend

mod flags;
mod value;

use std::fmt;

use serde::Serialize;

pub use flags::{Interfaces, PositionFields, Provides, Resources};
pub use value::{address_keys, Address, Position, ProviderInfo};

/// Status of a provider.
///
/// Ordered from worst to best so that "at least acquiring" style checks
/// read naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ProviderStatus {
    /// The backend failed or crashed.
    Error,
    /// The backend cannot currently provide data.
    Unavailable,
    /// The backend is working on a result (e.g. GPS acquiring a fix).
    Acquiring,
    /// The backend has current data.
    Available,
}

impl ProviderStatus {
    /// Short name for logs and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStatus::Error => "Error",
            ProviderStatus::Unavailable => "Unavailable",
            ProviderStatus::Acquiring => "Acquiring",
            ProviderStatus::Available => "Available",
        }
    }

    /// Returns true if the provider has usable data.
    pub fn is_available(&self) -> bool {
        matches!(self, ProviderStatus::Available)
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A capability the master selects providers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Capability {
    /// Latitude/longitude/altitude.
    Position,
    /// Postal address details.
    Address,
}

impl Capability {
    /// Both arbitrated capabilities.
    pub const ALL: [Capability; 2] = [Capability::Position, Capability::Address];

    /// The manifest interface flag that declares this capability.
    pub fn interface(&self) -> Interfaces {
        match self {
            Capability::Position => Interfaces::POSITION,
            Capability::Address => Interfaces::ADDRESS,
        }
    }

    /// Short name for logs and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Position => "position",
            Capability::Address => "address",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
