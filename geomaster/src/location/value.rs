//! Provider result values.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::PositionFields;
use crate::accuracy::Accuracy;

/// Well-known address detail keys.
pub mod address_keys {
    pub const COUNTRY_CODE: &str = "countrycode";
    pub const COUNTRY: &str = "country";
    pub const REGION: &str = "region";
    pub const LOCALITY: &str = "locality";
    pub const AREA: &str = "area";
    pub const POSTAL_CODE: &str = "postalcode";
    pub const STREET: &str = "street";

    /// All known keys, coarsest first.
    pub const ALL: [&str; 7] = [
        COUNTRY_CODE,
        COUNTRY,
        REGION,
        LOCALITY,
        AREA,
        POSTAL_CODE,
        STREET,
    ];
}

/// A position fix.
///
/// Fields not flagged in `fields` are undefined and left at zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub timestamp: DateTime<Utc>,
    pub fields: PositionFields,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub accuracy: Accuracy,
}

impl Position {
    /// Position carrying no data.
    pub fn empty() -> Self {
        Self {
            timestamp: Utc::now(),
            fields: PositionFields::empty(),
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            accuracy: Accuracy::NONE,
        }
    }

    /// Build a latitude/longitude fix.
    pub fn new_2d(latitude: f64, longitude: f64, accuracy: Accuracy) -> Self {
        Self {
            timestamp: Utc::now(),
            fields: PositionFields::LATITUDE | PositionFields::LONGITUDE,
            latitude,
            longitude,
            altitude: 0.0,
            accuracy,
        }
    }

    /// Add an altitude to this fix.
    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = altitude;
        self.fields |= PositionFields::ALTITUDE;
        self
    }

    /// Returns true if both values describe the same fix, ignoring timestamps.
    pub fn same_fix(&self, other: &Position) -> bool {
        self.fields == other.fields
            && self.latitude == other.latitude
            && self.longitude == other.longitude
            && self.altitude == other.altitude
            && self.accuracy == other.accuracy
    }
}

/// A postal address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Address {
    pub timestamp: DateTime<Utc>,
    pub details: BTreeMap<String, String>,
    pub accuracy: Accuracy,
}

impl Address {
    /// Address carrying no data.
    pub fn empty() -> Self {
        Self::new(BTreeMap::new(), Accuracy::NONE)
    }

    pub fn new(details: BTreeMap<String, String>, accuracy: Accuracy) -> Self {
        Self {
            timestamp: Utc::now(),
            details,
            accuracy,
        }
    }

    /// Look up a single detail.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }

    /// Returns true if both values describe the same address, ignoring timestamps.
    pub fn same_details(&self, other: &Address) -> bool {
        self.details == other.details && self.accuracy == other.accuracy
    }
}

/// Name and description a backend reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub description: String,
}

impl ProviderInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}
