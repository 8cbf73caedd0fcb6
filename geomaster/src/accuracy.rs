//! Accuracy levels and accuracy comparison.
//!
//! Every value a provider produces carries an [`Accuracy`]: a discrete
//! [`AccuracyLevel`] tier plus horizontal/vertical error estimates that are
//! only meaningful at [`AccuracyLevel::Detailed`].
//!
//! # Ordering
//!
//! [`Accuracy::compare`] returns `Ordering::Greater` when `self` is *more*
//! accurate than `other`:
//!
//! - Different levels order purely by level (`Detailed > Street > ... > None`)
//! - Two `Detailed` values order by ascending horizontal error
//!
//! A `Detailed` value with a huge horizontal error still ranks above a
//! `Street` value. Provider selection depends on this, so it is kept as is.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Discrete accuracy tier, ordered from least to most precise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub enum AccuracyLevel {
    /// No location information.
    #[default]
    None,
    /// Country-level precision.
    Country,
    /// Region or state-level precision.
    Region,
    /// City or town-level precision.
    Locality,
    /// Postal code precision.
    PostalCode,
    /// Street-level precision.
    Street,
    /// Meter-level precision with error estimates.
    Detailed,
}

impl AccuracyLevel {
    /// All levels in ascending order.
    pub const ALL: [AccuracyLevel; 7] = [
        AccuracyLevel::None,
        AccuracyLevel::Country,
        AccuracyLevel::Region,
        AccuracyLevel::Locality,
        AccuracyLevel::PostalCode,
        AccuracyLevel::Street,
        AccuracyLevel::Detailed,
    ];

    /// Manifest token for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccuracyLevel::None => "None",
            AccuracyLevel::Country => "Country",
            AccuracyLevel::Region => "Region",
            AccuracyLevel::Locality => "Locality",
            AccuracyLevel::PostalCode => "Postalcode",
            AccuracyLevel::Street => "Street",
            AccuracyLevel::Detailed => "Detailed",
        }
    }
}

impl fmt::Display for AccuracyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown accuracy level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAccuracyLevelError(pub String);

impl fmt::Display for ParseAccuracyLevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown accuracy level '{}' (expected one of: None, Country, Region, \
             Locality, Postalcode, Street, Detailed)",
            self.0
        )
    }
}

impl std::error::Error for ParseAccuracyLevelError {}

impl FromStr for AccuracyLevel {
    type Err = ParseAccuracyLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(AccuracyLevel::None),
            "country" => Ok(AccuracyLevel::Country),
            "region" => Ok(AccuracyLevel::Region),
            "locality" => Ok(AccuracyLevel::Locality),
            "postalcode" | "postal_code" => Ok(AccuracyLevel::PostalCode),
            "street" => Ok(AccuracyLevel::Street),
            "detailed" => Ok(AccuracyLevel::Detailed),
            _ => Err(ParseAccuracyLevelError(s.to_string())),
        }
    }
}

/// Accuracy of a single provider result.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Accuracy {
    level: AccuracyLevel,
    horizontal_error_m: f64,
    vertical_error_m: f64,
}

impl Accuracy {
    /// Accuracy of a result that carries no location information.
    pub const NONE: Accuracy = Accuracy {
        level: AccuracyLevel::None,
        horizontal_error_m: 0.0,
        vertical_error_m: 0.0,
    };

    /// Create an accuracy with explicit error estimates (meters).
    pub fn new(level: AccuracyLevel, horizontal_error_m: f64, vertical_error_m: f64) -> Self {
        Self {
            level,
            horizontal_error_m,
            vertical_error_m,
        }
    }

    /// Create an accuracy with no error estimates.
    pub fn from_level(level: AccuracyLevel) -> Self {
        Self::new(level, 0.0, 0.0)
    }

    /// The accuracy tier.
    pub fn level(&self) -> AccuracyLevel {
        self.level
    }

    /// Horizontal error in meters (meaningful only at `Detailed`).
    pub fn horizontal_error(&self) -> f64 {
        self.horizontal_error_m
    }

    /// Vertical error in meters (meaningful only at `Detailed`).
    pub fn vertical_error(&self) -> f64 {
        self.vertical_error_m
    }

    /// Compare two accuracies.
    ///
    /// Returns `Greater` if `self` is more accurate than `other`, `Less` if it
    /// is less accurate, `Equal` otherwise. Vertical error never participates.
    pub fn compare(&self, other: &Accuracy) -> Ordering {
        if self.level == AccuracyLevel::Detailed && other.level == AccuracyLevel::Detailed {
            // Smaller horizontal error wins
            return other.horizontal_error_m.total_cmp(&self.horizontal_error_m);
        }
        self.level.cmp(&other.level)
    }

    /// Returns true if `self` is strictly more accurate than `other`.
    pub fn is_more_accurate_than(&self, other: &Accuracy) -> bool {
        self.compare(other) == Ordering::Greater
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.level == AccuracyLevel::Detailed {
            write!(
                f,
                "Detailed (±{:.0}m h, ±{:.0}m v)",
                self.horizontal_error_m, self.vertical_error_m
            )
        } else {
            write!(f, "{}", self.level)
        }
    }
}
