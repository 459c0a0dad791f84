// src/types.rs — Wire-level types shared by the Socket.IO handlers and the broker.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::broker::ServerEvent;

// ── Connection id ─────────────────────────────────────────────────────────────

/// Transport-assigned id of one live control channel (the Socket.IO session id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnId(String);

impl ConnId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for ConnId {
    fn from(s: &str) -> Self { Self(s.to_owned()) }
}

impl From<String> for ConnId {
    fn from(s: String) -> Self { Self(s) }
}

// ── Negotiation relay ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind { Offer, Answer, Candidate }

impl RelayKind {
    /// Socket.IO event name, identical in both directions.
    pub fn event(self) -> &'static str {
        match self {
            RelayKind::Offer     => event::OFFER,
            RelayKind::Answer    => event::ANSWER,
            RelayKind::Candidate => event::ICE_CANDIDATE,
        }
    }

    /// Key under which the opaque payload travels.
    pub fn field(self) -> &'static str {
        match self {
            RelayKind::Offer     => "offer",
            RelayKind::Answer    => "answer",
            RelayKind::Candidate => "candidate",
        }
    }
}

// ── Inbound payloads (client → server) ───────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ReceiverJoinPayload {
    #[serde(rename = "userId")]
    pub handle:     String,
    #[serde(default, rename = "token")]
    pub credential: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallUserPayload { pub to: String }

/// Shared by accept-call and reject-call.
#[derive(Debug, Deserialize)]
pub struct CallerPayload {
    #[serde(rename = "callerSocketId")]
    pub caller: ConnId,
}

#[derive(Debug, Deserialize)]
pub struct OfferPayload     { pub to: ConnId, pub offer: Value }
#[derive(Debug, Deserialize)]
pub struct AnswerPayload    { pub to: ConnId, pub answer: Value }
#[derive(Debug, Deserialize)]
pub struct CandidatePayload { pub to: ConnId, pub candidate: Value }

// ── Event name constants ──────────────────────────────────────────────────────

pub mod event {
    // client → server
    pub const RECEIVER_JOIN:     &str = "receiver-join";
    pub const CALL_USER:         &str = "call-user";
    pub const ACCEPT_CALL:       &str = "accept-call";
    pub const REJECT_CALL:       &str = "reject-call";
    pub const END_CALL:          &str = "end-call";

    // server → client
    pub const REGISTERED:        &str = "registered";
    pub const REGISTER_ERROR:    &str = "register-error";
    pub const INCOMING_CALL:     &str = "incoming-call";
    pub const CALL_ACCEPTED:     &str = "call-accepted";
    pub const CALL_REJECTED:     &str = "call-rejected";
    pub const RECEIVER_OFFLINE:  &str = "receiver-offline";
    pub const CALL_ENDED:        &str = "call-ended";
    pub const PEER_DISCONNECTED: &str = "peer-disconnected";

    // both directions
    pub const OFFER:             &str = "offer";
    pub const ANSWER:            &str = "answer";
    pub const ICE_CANDIDATE:     &str = "ice-candidate";
}

// ── Outbound payloads (server → client) ──────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredPayload { pub user_id: String, pub connection_id: ConnId }

#[derive(Debug, Serialize)]
pub struct ErrorPayload { pub message: String }

#[derive(Debug, Serialize)]
pub struct IncomingCallPayload {
    #[serde(rename = "callerSocketId")]
    pub caller: ConnId,
}

#[derive(Debug, Serialize)]
pub struct CallAcceptedPayload {
    #[serde(rename = "receiverSocketId")]
    pub callee: ConnId,
}

#[derive(Debug, Serialize)]
pub struct CallRejectedPayload { pub by: ConnId }

#[derive(Debug, Serialize)]
pub struct ReceiverOfflinePayload { pub to: String }

#[derive(Debug, Serialize)]
pub struct CallEndedPayload { pub by: ConnId }

#[derive(Debug, Serialize)]
pub struct PeerDisconnectedPayload { pub peer: ConnId }

/// `{ "from": <id>, "<offer|answer|candidate>": <payload> }`
pub fn relay_payload(kind: RelayKind, from: &ConnId, payload: Value) -> Value {
    let mut body = serde_json::Map::with_capacity(2);
    body.insert("from".into(), Value::String(from.to_string()));
    body.insert(kind.field().into(), payload);
    Value::Object(body)
}

/// Socket.IO event name and body for a broker event sent to connection `own`.
pub fn wire_event(ev: ServerEvent, own: &ConnId) -> serde_json::Result<(&'static str, Value)> {
    use serde_json::to_value;

    let out = match ev {
        ServerEvent::Registered { handle } => (
            event::REGISTERED,
            to_value(RegisteredPayload { user_id: handle, connection_id: own.clone() })?,
        ),
        ServerEvent::RegisterFailed(err) => {
            (event::REGISTER_ERROR, to_value(ErrorPayload { message: err.to_string() })?)
        }
        ServerEvent::IncomingCall { caller } => {
            (event::INCOMING_CALL, to_value(IncomingCallPayload { caller })?)
        }
        ServerEvent::CallAccepted { callee } => {
            (event::CALL_ACCEPTED, to_value(CallAcceptedPayload { callee })?)
        }
        ServerEvent::CallRejected { by } => {
            (event::CALL_REJECTED, to_value(CallRejectedPayload { by })?)
        }
        ServerEvent::TargetUnreachable { target } => {
            (event::RECEIVER_OFFLINE, to_value(ReceiverOfflinePayload { to: target })?)
        }
        ServerEvent::Relay { kind, from, payload } => {
            (kind.event(), relay_payload(kind, &from, payload))
        }
        ServerEvent::CallEnded { by } => (event::CALL_ENDED, to_value(CallEndedPayload { by })?),
        ServerEvent::PeerDisconnected { peer } => {
            (event::PEER_DISCONNECTED, to_value(PeerDisconnectedPayload { peer })?)
        }
    };
    Ok(out)
}
