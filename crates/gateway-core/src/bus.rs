// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process message bus (C4).
//!
//! Grounded on the discovery server's `RelayRouter`
//! (`HashMap<Key, mpsc::Sender<Msg>>` registration/forward), generalized
//! from one relay destination per participant to one queue per named
//! endpoint (`"manager"` plus one per node).

use crate::message::Envelope;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

const ENDPOINT_QUEUE_DEPTH: usize = 256;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("endpoint {0:?} is not registered")]
    UnknownEndpoint(String),
    #[error("endpoint {0:?} queue is full")]
    WouldBlock(String),
    #[error("endpoint {0:?} is closed")]
    Closed(String),
}

/// A node (or the manager)'s receive handle.
pub struct Endpoint {
    name: String,
    rx: mpsc::Receiver<(String, Envelope)>,
}

impl Endpoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the next envelope together with the sender's address.
    /// Message boundaries are preserved (one `recv` = one envelope).
    pub async fn recv(&mut self) -> Option<(String, Envelope)> {
        self.rx.recv().await
    }
}

/// Non-blocking, best-effort in-process transport. Delivery is FIFO
/// per `(sender, receiver)` pair; no ordering is guaranteed across
/// pairs, and there is no broadcast primitive — fan-out is implemented
/// by callers issuing one `send_to` per destination.
#[derive(Default)]
pub struct Bus {
    senders: Mutex<HashMap<String, mpsc::Sender<(String, Envelope)>>>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or recreate) the receive queue for `name`.
    pub fn register(&self, name: impl Into<String>) -> Endpoint {
        let name = name.into();
        let (tx, rx) = mpsc::channel(ENDPOINT_QUEUE_DEPTH);
        self.senders.lock().unwrap().insert(name.clone(), tx);
        Endpoint { name, rx }
    }

    pub fn deregister(&self, name: &str) {
        self.senders.lock().unwrap().remove(name);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.senders.lock().unwrap().contains_key(name)
    }

    /// Non-blocking send with a bounded queue; returns `WouldBlock` if
    /// the receiver's queue is full, leaving the envelope with the
    /// caller to dispose of.
    pub fn try_send(&self, sender: &str, receiver: &str, envelope: Envelope) -> Result<(), BusError> {
        let tx = {
            let senders = self.senders.lock().unwrap();
            senders.get(receiver).cloned()
        };
        let tx = tx.ok_or_else(|| BusError::UnknownEndpoint(receiver.to_string()))?;
        tx.try_send((sender.to_string(), envelope)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BusError::WouldBlock(receiver.to_string()),
            mpsc::error::TrySendError::Closed(_) => BusError::Closed(receiver.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;

    #[tokio::test]
    async fn send_then_recv_preserves_boundaries() {
        let bus = Bus::new();
        let mut ep = bus.register("d1");
        bus.try_send("manager", "d1", Envelope::new("manager", "d1", MessageType::NODE_INIT)).unwrap();
        bus.try_send("manager", "d1", Envelope::new("manager", "d1", MessageType::NODE_UNINIT)).unwrap();
        let (from1, e1) = ep.recv().await.unwrap();
        let (from2, e2) = ep.recv().await.unwrap();
        assert_eq!(from1, "manager");
        assert_eq!(from2, "manager");
        assert!(matches!(e1.body, MessageType::NODE_INIT));
        assert!(matches!(e2.body, MessageType::NODE_UNINIT));
    }

    #[tokio::test]
    async fn send_to_unknown_endpoint_fails() {
        let bus = Bus::new();
        let err = bus.try_send("manager", "ghost", Envelope::new("manager", "ghost", MessageType::NODE_INIT));
        assert!(matches!(err, Err(BusError::UnknownEndpoint(_))));
    }

    #[tokio::test]
    async fn deregister_makes_endpoint_unreachable() {
        let bus = Bus::new();
        let _ep = bus.register("a1");
        bus.deregister("a1");
        assert!(!bus.is_registered("a1"));
        assert!(bus.try_send("manager", "a1", Envelope::new("manager", "a1", MessageType::NODE_INIT)).is_err());
    }
}
