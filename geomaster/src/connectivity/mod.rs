//! Network connectivity monitoring.
//!
//! Providers that need the network, or whose results are cacheable per
//! connection, follow the connectivity status. Monitors publish the status
//! through a `tokio::sync::watch` channel; the master service reacts to
//! every change.

mod route;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tokio::sync::watch;

pub use route::{has_default_route, parse_route_table, RouteMonitor, DEFAULT_ROUTE_TABLE};

/// Network connectivity status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ConnectivityStatus {
    /// No monitor information yet.
    #[default]
    Unknown,
    Offline,
    /// A connection is being established.
    Acquiring,
    Online,
}

impl ConnectivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectivityStatus::Unknown => "unknown",
            ConnectivityStatus::Offline => "offline",
            ConnectivityStatus::Acquiring => "acquiring",
            ConnectivityStatus::Online => "online",
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, ConnectivityStatus::Online)
    }
}

impl fmt::Display for ConnectivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConnectivityStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unknown" => Ok(ConnectivityStatus::Unknown),
            "offline" => Ok(ConnectivityStatus::Offline),
            "acquiring" => Ok(ConnectivityStatus::Acquiring),
            "online" => Ok(ConnectivityStatus::Online),
            other => Err(format!("unknown connectivity status '{}'", other)),
        }
    }
}

/// Source of connectivity status.
pub trait ConnectivityMonitor: Send + Sync {
    /// Current status.
    fn status(&self) -> ConnectivityStatus;

    /// Receiver notified on every status change.
    fn subscribe(&self) -> watch::Receiver<ConnectivityStatus>;
}

/// A monitor whose status is set explicitly.
///
/// Used for fixed `online`/`offline` configurations and in tests.
#[derive(Debug)]
pub struct ManualConnectivity {
    tx: watch::Sender<ConnectivityStatus>,
}

impl ManualConnectivity {
    pub fn new(initial: ConnectivityStatus) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Change the status, notifying subscribers if it differs.
    pub fn set_status(&self, status: ConnectivityStatus) {
        self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

impl Default for ManualConnectivity {
    fn default() -> Self {
        Self::new(ConnectivityStatus::Unknown)
    }
}

impl ConnectivityMonitor for ManualConnectivity {
    fn status(&self) -> ConnectivityStatus {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectivityStatus> {
        self.tx.subscribe()
    }
}
