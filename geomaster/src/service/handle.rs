//! Application-side handles to a running [`MasterService`](super::MasterService).

use tokio::sync::{mpsc, oneshot};

use crate::backend::BackendOptions;
use crate::error::MasterError;
use crate::location::{Address, Capability, Position};
use crate::master::{ClientEvent, ClientId, ProviderSnapshot, Requirements};

type Reply<T> = oneshot::Sender<Result<T, MasterError>>;

/// Requests served by the arbitration task.
pub(crate) enum Request {
    CreateClient {
        events: mpsc::UnboundedSender<ClientEvent>,
        reply: oneshot::Sender<ClientId>,
    },
    RemoveClient {
        client: ClientId,
    },
    SetRequirements {
        client: ClientId,
        requirements: Requirements,
        reply: Reply<()>,
    },
    Start {
        client: ClientId,
        capability: Capability,
        reply: Reply<()>,
    },
    Position {
        client: ClientId,
        reply: Reply<Position>,
    },
    Address {
        client: ClientId,
        reply: Reply<Address>,
    },
    SetOptions {
        client: ClientId,
        options: BackendOptions,
        reply: Reply<()>,
    },
    Providers {
        reply: oneshot::Sender<Vec<ProviderSnapshot>>,
    },
}

/// Cloneable entry point to the service.
///
/// The service keeps running while any `MasterHandle` or [`ClientHandle`]
/// is alive, unless its shutdown token fires first.
#[derive(Debug, Clone)]
pub struct MasterHandle {
    requests: mpsc::UnboundedSender<Request>,
}

impl MasterHandle {
    pub(crate) fn new(requests: mpsc::UnboundedSender<Request>) -> Self {
        Self { requests }
    }

    /// Open a new client session.
    pub async fn create_client(&self) -> Result<ClientHandle, MasterError> {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (reply, rx) = oneshot::channel();
        send(
            &self.requests,
            Request::CreateClient {
                events: events_tx,
                reply,
            },
        )?;
        let id = rx.await.map_err(|_| MasterError::ServiceStopped)?;
        Ok(ClientHandle {
            id,
            requests: self.requests.clone(),
            events,
        })
    }

    /// Snapshot of every registered provider.
    pub async fn providers(&self) -> Result<Vec<ProviderSnapshot>, MasterError> {
        let (reply, rx) = oneshot::channel();
        send(&self.requests, Request::Providers { reply })?;
        rx.await.map_err(|_| MasterError::ServiceStopped)
    }
}

/// One application session.
///
/// Dropping the handle ends the session and releases its providers.
#[derive(Debug)]
pub struct ClientHandle {
    id: ClientId,
    requests: mpsc::UnboundedSender<Request>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
}

impl ClientHandle {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub async fn set_requirements(&self, requirements: Requirements) -> Result<(), MasterError> {
        self.call(|reply| Request::SetRequirements {
            client: self.id,
            requirements,
            reply,
        })
        .await
    }

    /// Start position tracking. Fails if already started.
    pub async fn position_start(&self) -> Result<(), MasterError> {
        self.start(Capability::Position).await
    }

    /// Start address tracking. Fails if already started.
    pub async fn address_start(&self) -> Result<(), MasterError> {
        self.start(Capability::Address).await
    }

    /// Current position from the active provider.
    pub async fn position(&self) -> Result<Position, MasterError> {
        self.call(|reply| Request::Position {
            client: self.id,
            reply,
        })
        .await
    }

    /// Current address from the active provider.
    pub async fn address(&self) -> Result<Address, MasterError> {
        self.call(|reply| Request::Address {
            client: self.id,
            reply,
        })
        .await
    }

    /// Forward options to every running candidate backend.
    pub async fn set_options(&self, options: BackendOptions) -> Result<(), MasterError> {
        self.call(|reply| Request::SetOptions {
            client: self.id,
            options,
            reply,
        })
        .await
    }

    /// Wait for the next event. `None` once the service is gone.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    async fn start(&self, capability: Capability) -> Result<(), MasterError> {
        self.call(|reply| Request::Start {
            client: self.id,
            capability,
            reply,
        })
        .await
    }

    async fn call<T, F>(&self, build: F) -> Result<T, MasterError>
    where
        F: FnOnce(Reply<T>) -> Request,
    {
        let (reply, rx) = oneshot::channel();
        send(&self.requests, build(reply))?;
        rx.await.map_err(|_| MasterError::ServiceStopped)?
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        let _ = self.requests.send(Request::RemoveClient { client: self.id });
    }
}

fn send(requests: &mpsc::UnboundedSender<Request>, request: Request) -> Result<(), MasterError> {
    requests
        .send(request)
        .map_err(|_| MasterError::ServiceStopped)
}
