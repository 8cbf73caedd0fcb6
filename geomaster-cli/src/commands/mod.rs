//! CLI command implementations.
//!
//! - [`locate`] - Run the master in-process and print location events
//! - [`providers`] - List installed provider manifests
//! - [`run`] - Serve until Ctrl-C

pub mod locate;
pub mod providers;
pub mod run;
