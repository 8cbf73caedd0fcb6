//! Geomaster - location provider arbitration
//!
//! This library implements the master side of a location service: it loads
//! provider manifests, keeps one [`master::MasterProvider`] per provider,
//! and arbitrates between them on behalf of application sessions
//! ([`master::MasterClient`]), failing over when the active provider degrades.
//!
//! The arbitration core in [`master`] is synchronous and owns all state. The
//! [`service`] module wraps it in a single tokio task that serializes
//! application requests, backend notifications and connectivity changes.

pub mod accuracy;
pub mod backend;
pub mod config;
pub mod connectivity;
pub mod descriptor;
pub mod error;
pub mod location;
pub mod logging;
pub mod master;
pub mod service;

/// Library version, taken from the crate manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use accuracy::{Accuracy, AccuracyLevel};
pub use error::{LocationError, LocationResult, MasterError};
