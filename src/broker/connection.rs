// src/broker/connection.rs — Per-connection call state machine.

use std::{collections::HashSet, sync::Arc};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{hub::Hub, CallState, ClientMessage, Inbound, PeerEvent, ServerEvent, Snapshot};
use crate::{
    error::SignalError,
    registry::PresenceRegistry,
    types::{ConnId, RelayKind},
};

pub(crate) struct Connection {
    id:       ConnId,
    handle:   Option<String>,
    state:    CallState,
    /// Attempt id of the current pairing, meaningless while Idle.
    call:     u64,
    registry: Arc<PresenceRegistry>,
    hub:      Hub,
    outbox:   mpsc::UnboundedSender<ServerEvent>,
}

impl Connection {
    pub(crate) fn new(
        id: ConnId,
        registry: Arc<PresenceRegistry>,
        hub: Hub,
        outbox: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        Self { id, handle: None, state: CallState::Idle, call: 0, registry, hub, outbox }
    }

    pub(crate) async fn run(
        mut self,
        inbox_tx: mpsc::UnboundedSender<Inbound>,
        mut inbox: mpsc::UnboundedReceiver<Inbound>,
    ) {
        if !self.hub.attach(self.id.clone(), inbox_tx).await {
            debug!("[·] {} arrived after shutdown", self.id);
            return self.terminate(inbox).await;
        }

        while let Some(msg) = inbox.recv().await {
            match msg {
                Inbound::Client(msg) => {
                    if let Err(err) = self.on_client(msg).await {
                        self.report(err);
                    }
                }
                Inbound::Peer { from, call, event } => self.on_peer(from, call, event).await,
                Inbound::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot());
                }
                Inbound::Disconnect => break,
            }
        }

        self.terminate(inbox).await;
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot { id: self.id.clone(), handle: self.handle.clone(), state: self.state.clone() }
    }

    fn emit(&self, event: ServerEvent) {
        if self.outbox.send(event).is_err() {
            debug!("[·] {} has no transport left, event dropped", self.id);
        }
    }

    fn report(&self, err: SignalError) {
        match err {
            SignalError::InvalidTransition(why) => {
                debug!("[·] {} dropped message in {:?}: {why}", self.id, self.state);
            }
            SignalError::TargetUnreachable(target) => {
                info!("[✗] {} called '{target}', not reachable", self.id);
                self.emit(ServerEvent::TargetUnreachable { target });
            }
            other => self.emit(ServerEvent::RegisterFailed(other)),
        }
    }

    // ── Client messages ──────────────────────────────────────────────────────

    async fn on_client(&mut self, msg: ClientMessage) -> Result<(), SignalError> {
        match msg {
            ClientMessage::RegisterReceiver { handle, credential } => {
                self.register(&handle, credential.as_deref()).await
            }
            ClientMessage::InitiateCall { target } => self.initiate(&target).await,
            ClientMessage::AcceptCall { caller } => self.accept(caller).await,
            ClientMessage::RejectCall { caller } => self.reject(caller).await,
            ClientMessage::Relay { kind, to, payload } => self.relay(kind, to, payload).await,
            ClientMessage::EndCall => self.end_call().await,
        }
    }

    async fn register(&mut self, handle: &str, credential: Option<&str>) -> Result<(), SignalError> {
        let bound = self.registry.register(handle, &self.id, credential).await?;

        // Joining under a new handle releases the old one.
        if let Some(old) = self.handle.replace(bound.clone()) {
            if old != bound {
                self.registry.unregister(&old, &self.id).await;
            }
        }

        self.emit(ServerEvent::Registered { handle: bound });
        Ok(())
    }

    async fn initiate(&mut self, target: &str) -> Result<(), SignalError> {
        if self.state != CallState::Idle {
            return Err(SignalError::InvalidTransition("call-user while already in a call"));
        }

        let target = target.trim();
        let callee = self
            .registry
            .lookup(target)
            .await
            .ok_or_else(|| SignalError::TargetUnreachable(target.to_owned()))?;

        if callee == self.id {
            return Err(SignalError::InvalidTransition("call-user to own handle"));
        }
        // Registered but its task already went away.
        let call = self.hub.next_call();
        if !self.hub.deliver(&callee, &self.id, call, PeerEvent::Invite).await {
            return Err(SignalError::TargetUnreachable(target.to_owned()));
        }

        info!("[~] Ringing: {} → '{target}' ({callee}), call #{call}", self.id);
        self.state = CallState::Outgoing { callee };
        self.call = call;
        Ok(())
    }

    async fn accept(&mut self, caller: ConnId) -> Result<(), SignalError> {
        if !matches!(&self.state, CallState::Incoming { caller: pending } if *pending == caller) {
            return Err(SignalError::InvalidTransition("accept-call without a matching invitation"));
        }

        if self.hub.deliver(&caller, &self.id, self.call, PeerEvent::Accepted).await {
            info!("[✓] {} accepted call from {caller}", self.id);
            self.state = CallState::Active { peer: caller };
        } else {
            self.state = CallState::Idle;
            self.emit(ServerEvent::PeerDisconnected { peer: caller });
        }
        Ok(())
    }

    async fn reject(&mut self, caller: ConnId) -> Result<(), SignalError> {
        if !matches!(&self.state, CallState::Incoming { caller: pending } if *pending == caller) {
            return Err(SignalError::InvalidTransition("reject-call without a matching invitation"));
        }

        self.hub.deliver(&caller, &self.id, self.call, PeerEvent::Rejected).await;
        info!("[✗] {} rejected call from {caller}", self.id);
        self.state = CallState::Idle;
        Ok(())
    }

    async fn relay(&mut self, kind: RelayKind, to: ConnId, payload: Value) -> Result<(), SignalError> {
        match &self.state {
            CallState::Active { peer } if *peer == to => {
                self.hub.deliver(&to, &self.id, self.call, PeerEvent::Relay { kind, payload }).await;
                Ok(())
            }
            _ => Err(SignalError::InvalidTransition("relay outside the active pairing")),
        }
    }

    async fn end_call(&mut self) -> Result<(), SignalError> {
        let Some(peer) = self.state.peer().cloned() else {
            return Err(SignalError::InvalidTransition("end-call without a call"));
        };

        self.hub.deliver(&peer, &self.id, self.call, PeerEvent::Ended).await;
        info!("[☎] {} ended call with {peer}", self.id);
        self.state = CallState::Idle;
        Ok(())
    }

    // ── Peer events ──────────────────────────────────────────────────────────

    async fn on_peer(&mut self, from: ConnId, call: u64, event: PeerEvent) {
        if let PeerEvent::Invite = event {
            if self.state == CallState::Idle {
                self.state = CallState::Incoming { caller: from.clone() };
                self.call = call;
                self.emit(ServerEvent::IncomingCall { caller: from });
            } else {
                // One call attempt at a time: refuse, keep the current one.
                info!("[✗] {} busy, refusing invitation from {from}", self.id);
                self.hub.deliver(&from, &self.id, call, PeerEvent::Rejected).await;
            }
            return;
        }

        if self.state.peer() != Some(&from) {
            debug!("[·] {} dropped {event:?} from unpaired {from}", self.id);
            return;
        }
        // Same peer, earlier attempt: a reply that crossed our hang-up.
        if call != self.call {
            debug!("[·] {} dropped {event:?} for stale call #{call} from {from}", self.id);
            return;
        }

        let outgoing = matches!(self.state, CallState::Outgoing { .. });
        let active = matches!(self.state, CallState::Active { .. });

        match event {
            PeerEvent::Accepted if outgoing => {
                self.state = CallState::Active { peer: from.clone() };
                self.emit(ServerEvent::CallAccepted { callee: from });
            }
            PeerEvent::Rejected if outgoing => {
                self.state = CallState::Idle;
                self.emit(ServerEvent::CallRejected { by: from });
            }
            PeerEvent::Relay { kind, payload } if active => {
                self.emit(ServerEvent::Relay { kind, from, payload });
            }
            PeerEvent::Ended => {
                self.state = CallState::Idle;
                self.emit(ServerEvent::CallEnded { by: from });
            }
            PeerEvent::Disconnected => {
                self.state = CallState::Idle;
                self.emit(ServerEvent::PeerDisconnected { peer: from });
            }
            other => debug!("[·] {} dropped {other:?} from {from} in {:?}", self.id, self.state),
        }
    }

    // ── Teardown ─────────────────────────────────────────────────────────────

    async fn terminate(mut self, mut inbox: mpsc::UnboundedReceiver<Inbound>) {
        if let Some(handle) = self.handle.take() {
            self.registry.unregister(&handle, &self.id).await;
        }

        let mut notified = HashSet::new();
        if let Some(peer) = self.state.peer().cloned() {
            self.hub.deliver(&peer, &self.id, self.call, PeerEvent::Disconnected).await;
            notified.insert(peer);
        }
        self.state = CallState::Terminated;

        self.hub.detach(&self.id).await;
        inbox.close();

        // Anyone who reached us after the last message we handled (an invite
        // in flight, a late accept) must not keep waiting on us.
        while let Some(msg) = inbox.recv().await {
            match msg {
                Inbound::Peer { from, call, event } => {
                    if !matches!(event, PeerEvent::Disconnected) && notified.insert(from.clone()) {
                        self.hub.deliver(&from, &self.id, call, PeerEvent::Disconnected).await;
                    }
                }
                Inbound::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot());
                }
                Inbound::Client(_) | Inbound::Disconnect => {}
            }
        }

        info!("[-] {} closed", self.id);
    }
}
