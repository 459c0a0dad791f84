// src/handlers/socket.rs — Socket.IO wiring: decode events into broker messages,
// pump broker events back out to the socket.

use socketioxide::extract::{Data, SocketRef, State};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    broker::{Broker, ClientMessage, ServerEvent},
    types::{
        event, wire_event, AnswerPayload, CallUserPayload, CallerPayload, CandidatePayload, ConnId,
        OfferPayload, ReceiverJoinPayload, RelayKind,
    },
};

// Handlers are sync on purpose: socketioxide runs them inline in arrival
// order, which keeps a client's messages FIFO into its connection task.
pub fn on_connect(socket: SocketRef, State(broker): State<Broker>) {
    let conn_id = ConnId::new(socket.id.to_string());
    let (conn, events) = broker.connect(conn_id.clone());
    info!("[+] Socket {conn_id} connected");

    tokio::spawn(pump_events(socket.clone(), conn_id, events));

    let c = conn.clone();
    socket.on(event::RECEIVER_JOIN, move |Data(p): Data<ReceiverJoinPayload>| {
        c.send(ClientMessage::RegisterReceiver { handle: p.handle, credential: p.credential });
    });

    let c = conn.clone();
    socket.on(event::CALL_USER, move |Data(p): Data<CallUserPayload>| {
        c.send(ClientMessage::InitiateCall { target: p.to });
    });

    let c = conn.clone();
    socket.on(event::ACCEPT_CALL, move |Data(p): Data<CallerPayload>| {
        c.send(ClientMessage::AcceptCall { caller: p.caller });
    });

    let c = conn.clone();
    socket.on(event::REJECT_CALL, move |Data(p): Data<CallerPayload>| {
        c.send(ClientMessage::RejectCall { caller: p.caller });
    });

    let c = conn.clone();
    socket.on(event::OFFER, move |Data(p): Data<OfferPayload>| {
        c.send(ClientMessage::Relay { kind: RelayKind::Offer, to: p.to, payload: p.offer });
    });

    let c = conn.clone();
    socket.on(event::ANSWER, move |Data(p): Data<AnswerPayload>| {
        c.send(ClientMessage::Relay { kind: RelayKind::Answer, to: p.to, payload: p.answer });
    });

    let c = conn.clone();
    socket.on(event::ICE_CANDIDATE, move |Data(p): Data<CandidatePayload>| {
        c.send(ClientMessage::Relay { kind: RelayKind::Candidate, to: p.to, payload: p.candidate });
    });

    let c = conn.clone();
    socket.on(event::END_CALL, move |_: SocketRef| {
        c.send(ClientMessage::EndCall);
    });

    socket.on_disconnect(move |s: SocketRef| {
        debug!("[-] Socket {} disconnected", s.id);
        conn.disconnect();
    });
}

// Runs until the connection task drops its outbox.
async fn pump_events(
    socket: SocketRef,
    conn_id: ConnId,
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
) {
    while let Some(ev) = events.recv().await {
        let sent = match wire_event(ev, &conn_id) {
            Ok((name, body)) => socket.emit(name, &body).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = sent {
            debug!("[·] emit to {conn_id} failed: {e}");
        }
    }
}
