// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Addressable endpoints handed to the distribution layer.
//!
//! The messaging layer is built around long-lived client connections: it
//! authorizes through a connection and sends replies to it. An HTTP batch has
//! no such connection, so every terminal operation gets a [`VirtualConnection`]
//! that routes exactly one reply or error back into its slot. Permitted
//! fire-and-forget messages are dispatched through a [`DetachedConnection`]
//! whose replies go nowhere.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tidewire_protocol::{Codec, ErrorEvent, Message};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::auth::AuthContext;
use crate::correlator::SlotState;

/// Endpoint the distribution layer authorizes through and replies to.
pub trait Connection: Send + Sync + fmt::Debug {
    /// Identity of the caller.
    fn auth_context(&self) -> &Arc<AuthContext>;

    /// Batch position this connection resolves, if any.
    fn slot_index(&self) -> Option<usize>;

    /// Whether replies sent now can still have an effect.
    fn is_open(&self) -> bool;

    /// Deliver a reply message.
    fn accept(&self, reply: Message);

    /// Deliver an error for the operation routed through this connection.
    fn reject(&self, event: ErrorEvent, reason: &str);
}

/// A resolved slot on its way back to the correlator.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotUpdate {
    /// Batch position.
    pub index: usize,
    /// New, non-pending state.
    pub state: SlotState,
}

/// One-shot endpoint for a single terminal operation.
pub struct VirtualConnection {
    index: usize,
    auth: Arc<AuthContext>,
    request: Message,
    codec: Arc<dyn Codec>,
    updates: mpsc::UnboundedSender<SlotUpdate>,
    resolved: AtomicBool,
}

impl fmt::Debug for VirtualConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualConnection")
            .field("index", &self.index)
            .field("username", &self.auth.username)
            .field("topic", &self.request.topic())
            .field("action", &self.request.action())
            .field("resolved", &self.resolved.load(Ordering::Acquire))
            .finish()
    }
}

impl VirtualConnection {
    /// Create the connection for slot `index`, resolving through `updates`.
    pub fn new(
        index: usize,
        auth: Arc<AuthContext>,
        request: Message,
        codec: Arc<dyn Codec>,
        updates: mpsc::UnboundedSender<SlotUpdate>,
    ) -> Self {
        Self {
            index,
            auth,
            request,
            codec,
            updates,
            resolved: AtomicBool::new(false),
        }
    }

    /// The request this connection was created for.
    pub fn request(&self) -> &Message {
        &self.request
    }

    fn resolve(&self, state: SlotState) {
        if self.resolved.swap(true, Ordering::AcqRel) {
            debug!(index = self.index, "Slot already resolved, dropping outcome");
            return;
        }
        if self
            .updates
            .send(SlotUpdate {
                index: self.index,
                state,
            })
            .is_err()
        {
            debug!(index = self.index, "Batch already responded, dropping outcome");
        }
    }
}

impl Connection for VirtualConnection {
    fn auth_context(&self) -> &Arc<AuthContext> {
        &self.auth
    }

    fn slot_index(&self) -> Option<usize> {
        Some(self.index)
    }

    fn is_open(&self) -> bool {
        !self.resolved.load(Ordering::Acquire) && !self.updates.is_closed()
    }

    fn accept(&self, reply: Message) {
        match self.codec.encode(&reply) {
            Some(encoded) if encoded.terminal => {
                self.resolve(SlotState::from_result(encoded.result));
            }
            Some(_) => {
                trace!(index = self.index, action = reply.action(), "Non-terminal reply");
            }
            None => {
                debug!(
                    index = self.index,
                    topic = %reply.topic(),
                    action = reply.action(),
                    "Ignoring message that is not a reply"
                );
            }
        }
    }

    fn reject(&self, event: ErrorEvent, reason: &str) {
        let encoded = self.codec.encode_error(&self.request, event, reason);
        if encoded.terminal {
            self.resolve(SlotState::from_result(encoded.result));
        }
    }
}

/// Endpoint for permitted fire-and-forget messages. Nothing waits on it.
#[derive(Debug)]
pub struct DetachedConnection {
    auth: Arc<AuthContext>,
}

impl DetachedConnection {
    /// Create a detached connection for `auth`.
    pub fn new(auth: Arc<AuthContext>) -> Self {
        Self { auth }
    }
}

impl Connection for DetachedConnection {
    fn auth_context(&self) -> &Arc<AuthContext> {
        &self.auth
    }

    fn slot_index(&self) -> Option<usize> {
        None
    }

    fn is_open(&self) -> bool {
        true
    }

    fn accept(&self, reply: Message) {
        trace!(
            topic = %reply.topic(),
            action = reply.action(),
            "Discarding reply to detached connection"
        );
    }

    fn reject(&self, event: ErrorEvent, reason: &str) {
        debug!(%event, reason, "Error for fire-and-forget message");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tidewire_protocol::{JsonCodec, RecordMessage, RpcMessage};

    fn read_request() -> Message {
        Message::Record(RecordMessage::Read {
            name: "r".to_string(),
        })
    }

    fn connection(index: usize) -> (VirtualConnection, mpsc::UnboundedReceiver<SlotUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = VirtualConnection::new(
            index,
            Arc::new(AuthContext::default()),
            read_request(),
            Arc::new(JsonCodec),
            tx,
        );
        (conn, rx)
    }

    #[test]
    fn test_accept_resolves_slot_once() {
        let (conn, mut rx) = connection(4);
        assert!(conn.is_open());
        assert_eq!(conn.slot_index(), Some(4));

        conn.accept(Message::Record(RecordMessage::ReadResponse {
            name: "r".to_string(),
            version: 1,
            data: json!({"a": 1}),
        }));
        conn.reject(ErrorEvent::RecordNotFound, "late error");

        let update = rx.try_recv().unwrap();
        assert_eq!(update.index, 4);
        match update.state {
            SlotState::Succeeded(fields) => assert_eq!(fields["version"], 1),
            other => panic!("unexpected {:?}", other),
        }
        assert!(rx.try_recv().is_err(), "second outcome must be dropped");
        assert!(!conn.is_open());
    }

    #[test]
    fn test_reject_writes_failed_slot() {
        let (conn, mut rx) = connection(0);
        conn.reject(ErrorEvent::RecordNotFound, "record not found");

        match rx.try_recv().unwrap().state {
            SlotState::Failed(fields) => {
                assert_eq!(fields["error"], "record not found");
                assert_eq!(fields["errorEvent"], "RECORD_NOT_FOUND");
                assert_eq!(fields["errorTopic"], "record");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_non_terminal_reply_keeps_slot_pending() {
        let (conn, mut rx) = connection(1);
        conn.accept(Message::Rpc(RpcMessage::Accept {
            name: "add".to_string(),
            correlation_id: "c".to_string(),
        }));
        conn.accept(read_request());

        assert!(rx.try_recv().is_err());
        assert!(conn.is_open());
    }

    #[test]
    fn test_closed_batch_closes_connection() {
        let (conn, rx) = connection(2);
        drop(rx);
        assert!(!conn.is_open());
        // Must not panic when the batch is gone.
        conn.reject(ErrorEvent::RpcError, "boom");
    }
}
