//! Flag sets used by provider manifests and position results.

use bitflags::bitflags;
use serde::Serialize;

bitflags! {
    /// Interfaces a provider implements.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
    pub struct Interfaces: u32 {
        const POSITION = 1 << 0;
        const ADDRESS = 1 << 1;
        const VELOCITY = 1 << 2;
        const GEOCODE = 1 << 3;
        const REVERSE_GEOCODE = 1 << 4;
    }
}

impl Interfaces {
    /// Parse a single manifest interface token.
    ///
    /// Accepts both bare names (`Position`) and dotted service interface
    /// names (`org.freedesktop.Geoclue.Position`); only the last segment
    /// is significant. Returns `None` for interfaces the master does not track.
    pub fn from_token(token: &str) -> Option<Interfaces> {
        let name = token.trim().rsplit('.').next().unwrap_or("");
        match name.to_lowercase().as_str() {
            "position" => Some(Interfaces::POSITION),
            "address" => Some(Interfaces::ADDRESS),
            "velocity" => Some(Interfaces::VELOCITY),
            "geocode" => Some(Interfaces::GEOCODE),
            "reversegeocode" => Some(Interfaces::REVERSE_GEOCODE),
            _ => None,
        }
    }
}

bitflags! {
    /// Physical resources a provider needs to function.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
    pub struct Resources: u32 {
        const NETWORK = 1 << 0;
        const CELL = 1 << 1;
        const GPS = 1 << 2;
    }
}

impl Resources {
    /// Parse a single manifest `Requires` token.
    pub fn from_token(token: &str) -> Option<Resources> {
        match token.trim().to_lowercase().as_str() {
            "requiresnetwork" | "network" => Some(Resources::NETWORK),
            "requirescell" | "cell" => Some(Resources::CELL),
            "requiresgps" | "gps" => Some(Resources::GPS),
            _ => None,
        }
    }

    /// Ranking cost of this resource set; lower is cheaper.
    pub fn cost(&self) -> u32 {
        self.bits()
    }

    /// Returns true if every required resource is in `allowed`.
    pub fn is_allowed_by(&self, allowed: Resources) -> bool {
        (*self & !allowed).is_empty()
    }
}

bitflags! {
    /// Behavioral guarantees a provider declares.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
    pub struct Provides: u32 {
        /// The provider emits change notifications.
        const UPDATES = 1 << 0;
        /// One fetch per connectivity session is enough.
        const CACHEABLE_ON_CONNECTION = 1 << 1;
    }
}

impl Provides {
    /// Parse a single manifest `Provides` token.
    pub fn from_token(token: &str) -> Option<Provides> {
        match token.trim().to_lowercase().as_str() {
            "providesupdates" | "updates" => Some(Provides::UPDATES),
            "providescacheableonconnection" | "cacheableonconnection" => {
                Some(Provides::CACHEABLE_ON_CONNECTION)
            }
            _ => None,
        }
    }
}

bitflags! {
    /// Which position fields are populated.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
    pub struct PositionFields: u32 {
        const LATITUDE = 1 << 0;
        const LONGITUDE = 1 << 1;
        const ALTITUDE = 1 << 2;
    }
}
