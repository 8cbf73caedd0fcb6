//! Asynchronous service around the arbitration core.
//!
//! [`MasterService::start`] moves a [`Master`](crate::master::Master) onto a
//! dedicated tokio task and returns a [`MasterHandle`]. Applications open
//! sessions with [`MasterHandle::create_client`] and talk to the master
//! through the returned [`ClientHandle`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use geomaster::backend::BuiltinConnector;
//! use geomaster::connectivity::ManualConnectivity;
//! use geomaster::service::MasterService;
//!
//! let shutdown = CancellationToken::new();
//! let (handle, task) = MasterService::start(
//!     master,
//!     Arc::new(BuiltinConnector::new()),
//!     Arc::new(ManualConnectivity::default()),
//!     shutdown.clone(),
//! );
//!
//! let mut client = handle.create_client().await?;
//! client.position_start().await?;
//! while let Some(event) = client.next_event().await {
//!     println!("{:?}", event);
//! }
//! ```

mod activation;
mod daemon;
mod handle;

pub use daemon::MasterService;
pub use handle::{ClientHandle, MasterHandle};
