//! Connectivity from the kernel routing table.
//!
//! [`RouteMonitor`] polls `/proc/net/route` and reports `Online` while a
//! default route over a non-loopback interface is up. If the table cannot
//! be read the status is `Unknown`, which does not gate any provider.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ConnectivityMonitor, ConnectivityStatus};

/// Location of the IPv4 routing table on Linux.
pub const DEFAULT_ROUTE_TABLE: &str = "/proc/net/route";

const RTF_UP: u32 = 0x0001;

/// One row of the routing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub iface: String,
    pub destination: u32,
    pub flags: u32,
}

/// Parse the contents of `/proc/net/route`.
///
/// The header line and malformed rows are skipped.
pub fn parse_route_table(content: &str) -> Vec<RouteEntry> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let iface = cols.next()?;
            let destination = u32::from_str_radix(cols.next()?, 16).ok()?;
            let _gateway = cols.next()?;
            let flags = u32::from_str_radix(cols.next()?, 16).ok()?;
            Some(RouteEntry {
                iface: iface.to_string(),
                destination,
                flags,
            })
        })
        .collect()
}

/// Returns true if the table has an active default route off loopback.
pub fn has_default_route(entries: &[RouteEntry]) -> bool {
    entries
        .iter()
        .any(|e| e.destination == 0 && e.flags & RTF_UP != 0 && e.iface != "lo")
}

/// Polling connectivity monitor backed by the routing table.
#[derive(Debug)]
pub struct RouteMonitor {
    tx: Arc<watch::Sender<ConnectivityStatus>>,
}

impl RouteMonitor {
    /// Start polling `table` every `interval` until `shutdown` is cancelled.
    ///
    /// The table is read once before returning so the initial status is
    /// already meaningful.
    pub async fn start(
        table: impl Into<PathBuf>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let table = table.into();
        let initial = read_status(&table).await;
        info!(table = %table.display(), status = %initial, "Route monitor started");

        let tx = Arc::new(watch::channel(initial).0);
        let task_tx = Arc::clone(&tx);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.cancelled() => break,

                    _ = ticker.tick() => {
                        let status = read_status(&table).await;
                        let changed = task_tx.send_if_modified(|current| {
                            if *current == status {
                                false
                            } else {
                                *current = status;
                                true
                            }
                        });
                        if changed {
                            info!(status = %status, "Connectivity changed");
                        }
                    }
                }
            }

            debug!("Route monitor stopped");
        });

        (Self { tx }, handle)
    }
}

impl ConnectivityMonitor for RouteMonitor {
    fn status(&self) -> ConnectivityStatus {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectivityStatus> {
        self.tx.subscribe()
    }
}

async fn read_status(table: &std::path::Path) -> ConnectivityStatus {
    match tokio::fs::read_to_string(table).await {
        Ok(content) => {
            if has_default_route(&parse_route_table(&content)) {
                ConnectivityStatus::Online
            } else {
                ConnectivityStatus::Offline
            }
        }
        Err(e) => {
            debug!(table = %table.display(), error = %e, "Cannot read routing table");
            ConnectivityStatus::Unknown
        }
    }
}
