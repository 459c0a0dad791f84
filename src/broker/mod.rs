//! Call broker.
//!
//! Every connection gets its own task ([`connection`]) that owns the
//! connection's call state and drains a FIFO inbox. Client messages, events
//! posted by the paired peer and the disconnect signal all go through that
//! inbox, so a connection's state is only ever touched by its own task.

mod connection;
mod hub;

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinSet,
};
use tracing::{info, warn};

use crate::{
    error::SignalError,
    registry::PresenceRegistry,
    types::{ConnId, RelayKind},
};
use connection::Connection;
use hub::Hub;

/// Semantic messages a client sends, already decoded from the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    RegisterReceiver { handle: String, credential: Option<String> },
    InitiateCall     { target: String },
    AcceptCall       { caller: ConnId },
    RejectCall       { caller: ConnId },
    Relay            { kind: RelayKind, to: ConnId, payload: Value },
    EndCall,
}

/// Semantic messages the broker sends to its client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Registered        { handle: String },
    RegisterFailed(SignalError),
    IncomingCall      { caller: ConnId },
    CallAccepted      { callee: ConnId },
    CallRejected      { by: ConnId },
    TargetUnreachable { target: String },
    Relay             { kind: RelayKind, from: ConnId, payload: Value },
    CallEnded         { by: ConnId },
    PeerDisconnected  { peer: ConnId },
}

/// Call state of one connection. The peer id is the only record of a call attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallState {
    Idle,
    /// Invited, as the caller.
    Outgoing { callee: ConnId },
    /// Invited, as the callee.
    Incoming { caller: ConnId },
    Active   { peer: ConnId },
    Terminated,
}

impl CallState {
    pub fn peer(&self) -> Option<&ConnId> {
        match self {
            CallState::Outgoing { callee: p }
            | CallState::Incoming { caller: p }
            | CallState::Active { peer: p } => Some(p),
            CallState::Idle | CallState::Terminated => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id:     ConnId,
    pub handle: Option<String>,
    pub state:  CallState,
}

/// Events one connection task posts into its peer's inbox. Each travels with
/// the id of the call attempt it belongs to; replies for an attempt that is
/// no longer current are dropped.
#[derive(Debug)]
pub(crate) enum PeerEvent {
    Invite,
    Accepted,
    Rejected,
    Relay { kind: RelayKind, payload: Value },
    Ended,
    Disconnected,
}

pub(crate) enum Inbound {
    Client(ClientMessage),
    Peer { from: ConnId, call: u64, event: PeerEvent },
    Snapshot(oneshot::Sender<Snapshot>),
    Disconnect,
}

/// Process-wide broker: owns the presence registry and the connection arena.
#[derive(Clone)]
pub struct Broker {
    registry: Arc<PresenceRegistry>,
    hub:      Hub,
    tasks:    Arc<Mutex<JoinSet<()>>>,
}

impl Broker {
    pub fn new(registry: Arc<PresenceRegistry>) -> Self {
        Self { registry, hub: Hub::default(), tasks: Arc::default() }
    }

    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.registry
    }

    /// Starts the task for a freshly connected transport channel.
    ///
    /// Messages sent through the handle before the task is scheduled are
    /// queued, so callers can wire events immediately. Must be called inside
    /// a tokio runtime.
    pub fn connect(&self, id: ConnId) -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();

        let conn = Connection::new(id.clone(), self.registry.clone(), self.hub.clone(), outbox_tx);
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        // Reap finished connections so the set only holds live ones.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(conn.run(inbox_tx.clone(), inbox_rx));
        drop(tasks);

        (ConnectionHandle { id, inbox: inbox_tx }, outbox_rx)
    }

    pub async fn live_connections(&self) -> usize {
        self.hub.len().await
    }

    /// Disconnects every live connection and waits for each to finish its
    /// teardown. Returns how many were told to close.
    pub async fn shutdown(&self) -> usize {
        let mut closed = 0;
        for id in self.hub.close().await {
            if self.hub.post(&id, Inbound::Disconnect).await {
                closed += 1;
            }
        }
        info!("[-] Broker shutting down, closing {closed} connections");

        let mut tasks = {
            let mut guard = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                warn!("[!] Connection task failed during shutdown: {e}");
            }
        }
        info!("[-] Broker stopped");
        closed
    }
}

/// Transport-side handle to one connection task.
#[derive(Clone)]
pub struct ConnectionHandle {
    id:    ConnId,
    inbox: mpsc::UnboundedSender<Inbound>,
}

impl ConnectionHandle {
    pub fn id(&self) -> &ConnId {
        &self.id
    }

    /// Queues a client message. False once the connection has terminated.
    pub fn send(&self, msg: ClientMessage) -> bool {
        self.inbox.send(Inbound::Client(msg)).is_ok()
    }

    pub fn disconnect(&self) {
        let _ = self.inbox.send(Inbound::Disconnect);
    }

    /// State as seen by the connection task once everything queued before
    /// this call has been handled. `None` after the task is gone.
    pub async fn snapshot(&self) -> Option<Snapshot> {
        let (tx, rx) = oneshot::channel();
        self.inbox.send(Inbound::Snapshot(tx)).ok()?;
        rx.await.ok()
    }
}
