// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock distributor for testing.
//!
//! Records every dispatched message and either answers terminal requests
//! immediately with a canned reply or holds their connections so a test can
//! resolve them later, in any order.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tidewire_protocol::{Message, PresenceMessage, RecordMessage, RpcMessage};

use super::Distributor;
use crate::connection::Connection;

/// A message the mock received.
#[derive(Debug, Clone)]
pub struct Dispatched {
    /// Connection the message was sent for.
    pub connection: Arc<dyn Connection>,
    /// The message.
    pub message: Message,
}

/// Mock distributor for testing.
pub struct MockDistributor {
    dispatched: Mutex<Vec<Dispatched>>,
    /// If true, terminal requests get an immediate successful reply.
    pub reply_immediately: bool,
}

impl Default for MockDistributor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDistributor {
    /// Create a mock that answers every terminal request immediately.
    pub fn new() -> Self {
        Self {
            dispatched: Mutex::new(Vec::new()),
            reply_immediately: true,
        }
    }

    /// Create a mock that never answers on its own.
    pub fn holding() -> Self {
        Self {
            dispatched: Mutex::new(Vec::new()),
            reply_immediately: false,
        }
    }

    /// Number of `distribute` calls so far.
    pub fn call_count(&self) -> usize {
        self.lock().len()
    }

    /// Messages received so far, in dispatch order.
    pub fn messages(&self) -> Vec<Message> {
        self.lock().iter().map(|d| d.message.clone()).collect()
    }

    /// Connection dispatched for batch position `index`.
    pub fn connection_for(&self, index: usize) -> Option<Arc<dyn Connection>> {
        self.lock()
            .iter()
            .find(|d| d.connection.slot_index() == Some(index))
            .map(|d| Arc::clone(&d.connection))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Dispatched>> {
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Distributor for MockDistributor {
    fn distribute(&self, connection: Arc<dyn Connection>, message: Message) {
        self.lock().push(Dispatched {
            connection: Arc::clone(&connection),
            message: message.clone(),
        });

        if self.reply_immediately {
            if let Some(reply) = canned_reply(&message) {
                connection.accept(reply);
            }
        }
    }
}

/// A successful reply for a request message; `None` for fire-and-forget.
pub fn canned_reply(request: &Message) -> Option<Message> {
    let reply = match request {
        Message::Event(_) => return None,
        Message::Record(record) => Message::Record(match record {
            RecordMessage::Read { name } => RecordMessage::ReadResponse {
                name: name.clone(),
                version: 1,
                data: Value::Null,
            },
            RecordMessage::Head { name } => RecordMessage::HeadResponse {
                name: name.clone(),
                version: 1,
            },
            RecordMessage::Write { name, .. } => RecordMessage::WriteAck { name: name.clone() },
            RecordMessage::Notify { .. } => RecordMessage::NotifyAck,
            RecordMessage::Delete { name } => RecordMessage::DeleteAck { name: name.clone() },
            _ => return None,
        }),
        Message::Rpc(RpcMessage::Request {
            name,
            correlation_id,
            data,
        }) => Message::Rpc(RpcMessage::Response {
            name: name.clone(),
            correlation_id: correlation_id.clone(),
            data: data.clone(),
        }),
        Message::Presence(PresenceMessage::Query { .. }) => {
            Message::Presence(PresenceMessage::QueryResponse { users: Vec::new() })
        }
        Message::Rpc(_) | Message::Presence(_) => return None,
    };
    Some(reply)
}
