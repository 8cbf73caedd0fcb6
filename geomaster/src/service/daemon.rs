//! The arbitration task.
//!
//! # Architecture
//!
//! ```text
//!   ClientHandle ── Request ─────┐
//!   backends ────── MasterEvent ─┼──► Master ──► ClientEvent ──► applications
//!   monitor ─────── connectivity ┘      │
//!                                       └──► BackendCommand ──► spawned calls
//! ```
//!
//! Every input is applied to the [`Master`] to completion before the next
//! one is taken, then the backend commands it produced are spawned. Backend
//! calls never run on this task, so a slow provider cannot stall
//! arbitration.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::activation;
use super::handle::{MasterHandle, Request};
use crate::backend::BackendConnector;
use crate::connectivity::ConnectivityMonitor;
use crate::error::MasterError;
use crate::master::{BackendCommand, Lookup, Master, MasterEvent};

/// Runs a [`Master`] on its own task.
pub struct MasterService {
    master: Master,
    connector: Arc<dyn BackendConnector>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    requests: mpsc::UnboundedReceiver<Request>,
    events_tx: mpsc::UnboundedSender<MasterEvent>,
    events_rx: mpsc::UnboundedReceiver<MasterEvent>,
}

impl MasterService {
    /// Spawn the service.
    ///
    /// It stops when `shutdown` is cancelled or when every handle has been
    /// dropped. Either way clients are invalidated and backends released
    /// before the returned task completes.
    pub fn start(
        master: Master,
        connector: Arc<dyn BackendConnector>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        shutdown: CancellationToken,
    ) -> (MasterHandle, JoinHandle<()>) {
        let (request_tx, requests) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let service = Self {
            master,
            connector,
            connectivity,
            requests,
            events_tx,
            events_rx,
        };
        let task = tokio::spawn(service.run(shutdown));
        (MasterHandle::new(request_tx), task)
    }

    async fn run(mut self, shutdown: CancellationToken) {
        info!(
            providers = self.master.registry().len(),
            "Master service starting"
        );

        let mut connectivity = self.connectivity.subscribe();
        let initial = *connectivity.borrow_and_update();
        self.master.set_connectivity(initial);
        self.dispatch();

        let mut watching = true;
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Master service shutting down");
                    break;
                }

                Some(event) = self.events_rx.recv() => {
                    self.master.handle_event(event);
                }

                request = self.requests.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => {
                        info!("All handles dropped, master service stopping");
                        break;
                    }
                },

                changed = connectivity.changed(), if watching => match changed {
                    Ok(()) => {
                        let status = *connectivity.borrow_and_update();
                        self.master.set_connectivity(status);
                    }
                    Err(_) => {
                        debug!("Connectivity monitor closed");
                        watching = false;
                    }
                },
            }
            self.dispatch();
        }

        self.master.shutdown();
        let releases = self
            .master
            .take_commands()
            .into_iter()
            .filter_map(|command| match command {
                BackendCommand::Release { backend, .. } => Some(activation::release(backend)),
                _ => None,
            });
        join_all(releases).await;
        info!("Master service stopped");
    }

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::CreateClient { events, reply } => {
                let id = self.master.create_client(events);
                let _ = reply.send(id);
            }
            Request::RemoveClient { client } => {
                // Already gone if the client never finished registering
                let _ = self.master.remove_client(client);
            }
            Request::SetRequirements {
                client,
                requirements,
                reply,
            } => {
                let _ = reply.send(self.master.set_requirements(client, requirements));
            }
            Request::Start {
                client,
                capability,
                reply,
            } => {
                let _ = reply.send(self.master.start(client, capability));
            }
            Request::Position { client, reply } => match self.master.position(client) {
                Ok(Lookup::Ready(result)) => {
                    let _ = reply.send(result.map_err(MasterError::from));
                }
                Ok(Lookup::Fetch(fetch)) => {
                    let events = self.events_tx.clone();
                    tokio::spawn(async move {
                        let result = activation::fetch_position(fetch, &events).await;
                        let _ = reply.send(result.map_err(MasterError::from));
                    });
                }
                Err(err) => {
                    let _ = reply.send(Err(err));
                }
            },
            Request::Address { client, reply } => match self.master.address(client) {
                Ok(Lookup::Ready(result)) => {
                    let _ = reply.send(result.map_err(MasterError::from));
                }
                Ok(Lookup::Fetch(fetch)) => {
                    let events = self.events_tx.clone();
                    tokio::spawn(async move {
                        let result = activation::fetch_address(fetch, &events).await;
                        let _ = reply.send(result.map_err(MasterError::from));
                    });
                }
                Err(err) => {
                    let _ = reply.send(Err(err));
                }
            },
            Request::SetOptions {
                client,
                options,
                reply,
            } => {
                let _ = reply.send(self.master.set_options(client, options));
            }
            Request::Providers { reply } => {
                let _ = reply.send(self.master.snapshot());
            }
        }
    }

    /// Spawn the backend work the master asked for.
    fn dispatch(&mut self) {
        for command in self.master.take_commands() {
            debug!(?command, "Dispatching backend command");
            match command {
                BackendCommand::Activate {
                    provider,
                    epoch,
                    descriptor,
                } => {
                    tokio::spawn(activation::activate(
                        Arc::clone(&self.connector),
                        provider,
                        epoch,
                        descriptor,
                        self.events_tx.clone(),
                    ));
                }
                BackendCommand::Release { backend, .. } => {
                    tokio::spawn(activation::release(backend));
                }
                BackendCommand::SetOptions {
                    provider,
                    backend,
                    options,
                } => {
                    tokio::spawn(activation::set_options(provider, backend, options));
                }
            }
        }
    }
}
