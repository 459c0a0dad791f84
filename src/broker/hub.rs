// src/broker/hub.rs — Arena of live connection inboxes, keyed by connection id.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use tokio::sync::{mpsc, RwLock};

use super::{Inbound, PeerEvent};
use crate::types::ConnId;

pub(crate) type Inbox = mpsc::UnboundedSender<Inbound>;

/// The only way one connection task reaches another. Peers never touch each
/// other's state, they post into each other's inbox.
#[derive(Clone, Default)]
pub(crate) struct Hub {
    inboxes: Arc<RwLock<HashMap<ConnId, Inbox>>>,
    calls:   Arc<AtomicU64>,
    closed:  Arc<AtomicBool>,
}

impl Hub {
    /// False once the hub is closed; the connection must not start.
    pub(crate) async fn attach(&self, id: ConnId, inbox: Inbox) -> bool {
        let mut map = self.inboxes.write().await;
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        map.insert(id, inbox);
        true
    }

    pub(crate) async fn detach(&self, id: &ConnId) {
        self.inboxes.write().await.remove(id);
    }

    /// Fresh id for a call attempt, unique for the life of the process.
    pub(crate) fn next_call(&self) -> u64 {
        self.calls.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Posts `event` about attempt `call` from `from` into `to`'s inbox.
    /// False if `to` is gone (never attached, detached, or its inbox is closed).
    pub(crate) async fn deliver(
        &self,
        to: &ConnId,
        from: &ConnId,
        call: u64,
        event: PeerEvent,
    ) -> bool {
        self.post(to, Inbound::Peer { from: from.clone(), call, event }).await
    }

    pub(crate) async fn post(&self, to: &ConnId, msg: Inbound) -> bool {
        // Send under the read lock so nothing lands after `detach` returns.
        let map = self.inboxes.read().await;
        map.get(to).is_some_and(|tx| tx.send(msg).is_ok())
    }

    /// Refuses further attaches and returns everyone attached so far.
    pub(crate) async fn close(&self) -> Vec<ConnId> {
        let map = self.inboxes.write().await;
        self.closed.store(true, Ordering::Release);
        map.keys().cloned().collect()
    }

    pub(crate) async fn len(&self) -> usize {
        self.inboxes.read().await.len()
    }
}
