//! Signaling relay for one-to-one WebRTC calls.
//!
//! Callees join under a handle ([`registry`]), callers ring them by handle and
//! the [`broker`] relays accept/reject and the opaque offer/answer/candidate
//! payloads between exactly the two connections of a call.

pub mod accounts;
pub mod broker;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod registry;
pub mod types;
