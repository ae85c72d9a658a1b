// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process distribution layer.
//!
//! Backs a standalone bridge with the smallest useful platform:
//! - events are published on a tokio broadcast channel,
//! - records live in memory with monotonically increasing versions,
//! - RPCs go to closures registered with [`LocalDistributor::provide`],
//! - presence answers from a set of online users.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use serde_json::{Map, Value};
use tidewire_protocol::{
    ErrorEvent, EventMessage, Message, PresenceMessage, RecordMessage, RpcMessage,
};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::Distributor;
use crate::connection::Connection;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Handler registered for an RPC name.
pub type RpcProvider = Arc<dyn Fn(Option<Value>) -> Result<Value, String> + Send + Sync>;

/// An event published through the bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    /// Event name; `None` for unnamed events.
    pub name: Option<String>,
    /// Event payload.
    pub data: Option<Value>,
    /// Username of the publisher.
    pub publisher: Option<String>,
}

/// A record held by the local store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Current version, starting at 1.
    pub version: i64,
    /// Current data.
    pub data: Value,
}

/// In-memory [`Distributor`].
pub struct LocalDistributor {
    events: broadcast::Sender<PublishedEvent>,
    records: DashMap<String, StoredRecord>,
    providers: DashMap<String, RpcProvider>,
    online: DashSet<String>,
}

impl Default for LocalDistributor {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalDistributor {
    /// Create an empty distributor.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            events,
            records: DashMap::new(),
            providers: DashMap::new(),
            online: DashSet::new(),
        }
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.events.subscribe()
    }

    /// Current state of a record.
    pub fn record(&self, name: &str) -> Option<StoredRecord> {
        self.records.get(name).map(|r| r.value().clone())
    }

    /// Register the provider for RPC `name`, replacing any previous one.
    pub fn provide<F>(&self, name: impl Into<String>, provider: F)
    where
        F: Fn(Option<Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.providers.insert(name.into(), Arc::new(provider));
    }

    /// Mark `user` as online or offline for presence queries.
    pub fn set_online(&self, user: impl Into<String>, online: bool) {
        let user = user.into();
        if online {
            self.online.insert(user);
        } else {
            self.online.remove(&user);
        }
    }

    fn emit(&self, connection: &dyn Connection, name: Option<String>, data: Option<Value>) {
        let event = PublishedEvent {
            name,
            data,
            publisher: connection.auth_context().username.clone(),
        };
        // No subscribers is not an error for a broadcast.
        let receivers = self.events.send(event).unwrap_or(0);
        trace!(receivers, "Event published");
    }

    fn handle_record(&self, connection: &dyn Connection, record: RecordMessage) {
        let outcome = match record {
            RecordMessage::Read { name } => match self.records.get(&name) {
                Some(stored) => Ok(RecordMessage::ReadResponse {
                    version: stored.version,
                    data: stored.data.clone(),
                    name,
                }),
                None => Err(not_found(&name)),
            },
            RecordMessage::Head { name } => match self.records.get(&name) {
                Some(stored) => Ok(RecordMessage::HeadResponse {
                    version: stored.version,
                    name,
                }),
                None => Err(not_found(&name)),
            },
            RecordMessage::Write {
                name,
                data,
                path,
                version,
            } => self.write(name, data, path, version),
            RecordMessage::Notify { names } => {
                debug!(records = ?names, "Records changed externally");
                Ok(RecordMessage::NotifyAck)
            }
            RecordMessage::Delete { name } => match self.records.remove(&name) {
                Some(_) => Ok(RecordMessage::DeleteAck { name }),
                None => Err(not_found(&name)),
            },
            reply => Err((
                ErrorEvent::InvalidMessage,
                format!("\"{}\" is not a record request", Message::Record(reply).action()),
            )),
        };

        match outcome {
            Ok(reply) => connection.accept(Message::Record(reply)),
            Err((event, reason)) => connection.reject(event, &reason),
        }
    }

    fn write(
        &self,
        name: String,
        data: Value,
        path: Option<String>,
        version: i64,
    ) -> Result<RecordMessage, (ErrorEvent, String)> {
        let segments: Option<Vec<&str>> = path.as_deref().map(|p| p.split('.').collect());

        match self.records.entry(name.clone()) {
            Entry::Occupied(mut entry) => {
                let stored = entry.get_mut();
                let next = stored.version + 1;
                if version != -1 && version != next {
                    return Err(version_conflict(&name, next, version));
                }
                match &segments {
                    Some(segments) => set_path(&mut stored.data, segments, data),
                    None => stored.data = data,
                }
                stored.version = next;
            }
            Entry::Vacant(entry) => {
                if version != -1 && version != 1 {
                    return Err(version_conflict(&name, 1, version));
                }
                let mut initial = Value::Object(Map::new());
                match &segments {
                    Some(segments) => set_path(&mut initial, segments, data),
                    None => initial = data,
                }
                entry.insert(StoredRecord {
                    version: 1,
                    data: initial,
                });
            }
        }

        Ok(RecordMessage::WriteAck { name })
    }

    fn make_rpc(
        &self,
        connection: &dyn Connection,
        name: String,
        correlation_id: String,
        data: Option<Value>,
    ) {
        let provider = self.providers.get(&name).map(|p| Arc::clone(p.value()));
        let Some(provider) = provider else {
            connection.reject(
                ErrorEvent::NoRpcProvider,
                &format!("No provider available for rpc \"{}\"", name),
            );
            return;
        };

        connection.accept(Message::Rpc(RpcMessage::Accept {
            name: name.clone(),
            correlation_id: correlation_id.clone(),
        }));

        match provider(data) {
            Ok(result) => connection.accept(Message::Rpc(RpcMessage::Response {
                name,
                correlation_id,
                data: Some(result),
            })),
            Err(reason) => connection.reject(ErrorEvent::RpcError, &reason),
        }
    }

    fn query_presence(&self, connection: &dyn Connection, names: Option<Vec<String>>) {
        let mut users: Vec<String> = match names {
            Some(names) => names
                .into_iter()
                .filter(|n| self.online.contains(n))
                .collect(),
            None => self.online.iter().map(|u| u.key().clone()).collect(),
        };
        users.sort();
        users.dedup();
        connection.accept(Message::Presence(PresenceMessage::QueryResponse { users }));
    }
}

impl Distributor for LocalDistributor {
    fn distribute(&self, connection: Arc<dyn Connection>, message: Message) {
        if !connection.is_open() {
            debug!(action = message.action(), "Connection already resolved, skipping");
            return;
        }

        match message {
            Message::Event(EventMessage::Emit { name, data }) => {
                self.emit(connection.as_ref(), name, data)
            }
            Message::Record(record) => self.handle_record(connection.as_ref(), record),
            Message::Rpc(RpcMessage::Request {
                name,
                correlation_id,
                data,
            }) => self.make_rpc(connection.as_ref(), name, correlation_id, data),
            Message::Presence(PresenceMessage::Query { names }) => {
                self.query_presence(connection.as_ref(), names)
            }
            other @ (Message::Rpc(_) | Message::Presence(_)) => connection.reject(
                ErrorEvent::InvalidMessage,
                &format!("\"{}\" cannot be sent by a client", other.action()),
            ),
        }
    }
}

fn not_found(name: &str) -> (ErrorEvent, String) {
    (
        ErrorEvent::RecordNotFound,
        format!("Record \"{}\" not found", name),
    )
}

fn version_conflict(name: &str, expected: i64, got: i64) -> (ErrorEvent, String) {
    (
        ErrorEvent::VersionExists,
        format!(
            "Version conflict on record \"{}\": expected {}, got {}",
            name, expected, got
        ),
    )
}

/// Set the value at a dotted path, creating intermediate objects.
fn set_path(target: &mut Value, segments: &[&str], value: Value) {
    match segments.split_first() {
        None => *target = value,
        Some((head, rest)) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            if let Value::Object(map) = target {
                set_path(
                    map.entry(head.to_string()).or_insert(Value::Null),
                    rest,
                    value,
                );
            }
        }
    }
}
