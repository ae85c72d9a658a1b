// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Internal message model.
//!
//! Every operation a client can submit, and every reply the distribution layer
//! can send back, is one variant of the closed [`Message`] union. The wire
//! format lives in [`crate::codec`]; nothing here knows about JSON field names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message topics understood by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Publish/subscribe events.
    Event,
    /// Synchronized records.
    Record,
    /// Remote procedure calls.
    Rpc,
    /// Presence queries.
    Presence,
}

impl Topic {
    /// Wire name of the topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Record => "record",
            Self::Rpc => "rpc",
            Self::Presence => "presence",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "event" => Ok(Self::Event),
            "record" => Ok(Self::Record),
            "rpc" => Ok(Self::Rpc),
            "presence" => Ok(Self::Presence),
            other => Err(other.to_string()),
        }
    }
}

/// Event topic messages.
#[derive(Debug, Clone, PartialEq)]
pub enum EventMessage {
    /// Publish `data` to every subscriber of `name`. An unnamed event goes
    /// to subscribers of every event.
    Emit {
        /// Event name, if the client gave one.
        name: Option<String>,
        /// Optional event payload.
        data: Option<Value>,
    },
}

/// Record topic messages, requests and their replies.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordMessage {
    /// Read a record's full state.
    Read {
        /// Record name.
        name: String,
    },
    /// Reply to [`RecordMessage::Read`].
    ReadResponse {
        /// Record name.
        name: String,
        /// Current version.
        version: i64,
        /// Current data.
        data: Value,
    },
    /// Read only a record's version.
    Head {
        /// Record name.
        name: String,
    },
    /// Reply to [`RecordMessage::Head`].
    HeadResponse {
        /// Record name.
        name: String,
        /// Current version, `-1` when the record does not exist.
        version: i64,
    },
    /// Write a whole record or a path inside it.
    Write {
        /// Record name.
        name: String,
        /// New data (whole record or value at `path`).
        data: Value,
        /// Optional JSON path inside the record.
        path: Option<String>,
        /// Expected next version, `-1` to force.
        version: i64,
    },
    /// Reply to [`RecordMessage::Write`].
    WriteAck {
        /// Record name.
        name: String,
    },
    /// Tell the platform that records changed outside of it.
    Notify {
        /// Changed record names.
        names: Vec<String>,
    },
    /// Reply to [`RecordMessage::Notify`].
    NotifyAck,
    /// Delete a record.
    Delete {
        /// Record name.
        name: String,
    },
    /// Reply to [`RecordMessage::Delete`].
    DeleteAck {
        /// Record name.
        name: String,
    },
}

/// RPC topic messages.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcMessage {
    /// Call a remote procedure.
    Request {
        /// Procedure name.
        name: String,
        /// Identifier correlating accept/response with this request.
        correlation_id: String,
        /// Optional call payload.
        data: Option<Value>,
    },
    /// A provider took the request; the response is still pending.
    Accept {
        /// Procedure name.
        name: String,
        /// Correlation identifier of the request.
        correlation_id: String,
    },
    /// Final result of a call.
    Response {
        /// Procedure name.
        name: String,
        /// Correlation identifier of the request.
        correlation_id: String,
        /// Result payload.
        data: Option<Value>,
    },
}

/// Presence topic messages.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceMessage {
    /// Ask which users are online, optionally restricted to `names`.
    Query {
        /// Users of interest, `None` for everyone.
        names: Option<Vec<String>>,
    },
    /// Reply to [`PresenceMessage::Query`].
    QueryResponse {
        /// Online users.
        users: Vec<String>,
    },
}

/// A message on the internal messaging layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Event topic.
    Event(EventMessage),
    /// Record topic.
    Record(RecordMessage),
    /// RPC topic.
    Rpc(RpcMessage),
    /// Presence topic.
    Presence(PresenceMessage),
}

impl Message {
    /// Topic this message belongs to.
    pub fn topic(&self) -> Topic {
        match self {
            Self::Event(_) => Topic::Event,
            Self::Record(_) => Topic::Record,
            Self::Rpc(_) => Topic::Rpc,
            Self::Presence(_) => Topic::Presence,
        }
    }

    /// Action name, as written on the wire for requests.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Event(EventMessage::Emit { .. }) => "emit",
            Self::Record(record) => match record {
                RecordMessage::Read { .. } => "read",
                RecordMessage::ReadResponse { .. } => "read_response",
                RecordMessage::Head { .. } => "head",
                RecordMessage::HeadResponse { .. } => "head_response",
                RecordMessage::Write { .. } => "write",
                RecordMessage::WriteAck { .. } => "write_ack",
                RecordMessage::Notify { .. } => "notify",
                RecordMessage::NotifyAck => "notify_ack",
                RecordMessage::Delete { .. } => "delete",
                RecordMessage::DeleteAck { .. } => "delete_ack",
            },
            Self::Rpc(rpc) => match rpc {
                RpcMessage::Request { .. } => "make",
                RpcMessage::Accept { .. } => "accept",
                RpcMessage::Response { .. } => "response",
            },
            Self::Presence(presence) => match presence {
                PresenceMessage::Query { .. } => "query",
                PresenceMessage::QueryResponse { .. } => "query_response",
            },
        }
    }

    /// Event, record or procedure name the message addresses, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Event(EventMessage::Emit { name, .. }) => name.as_deref(),
            Self::Record(
                RecordMessage::Read { name }
                | RecordMessage::ReadResponse { name, .. }
                | RecordMessage::Head { name }
                | RecordMessage::HeadResponse { name, .. }
                | RecordMessage::Write { name, .. }
                | RecordMessage::WriteAck { name }
                | RecordMessage::Delete { name }
                | RecordMessage::DeleteAck { name },
            ) => Some(name.as_str()),
            Self::Record(RecordMessage::Notify { .. } | RecordMessage::NotifyAck) => None,
            Self::Rpc(
                RpcMessage::Request { name, .. }
                | RpcMessage::Accept { name, .. }
                | RpcMessage::Response { name, .. },
            ) => Some(name.as_str()),
            Self::Presence(_) => None,
        }
    }
}

/// Error events the messaging layer can report for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorEvent {
    /// Permission handler refused the action.
    MessageDenied,
    /// Message was structurally invalid for its handler.
    InvalidMessage,
    /// Record does not exist.
    RecordNotFound,
    /// Write carried a version that already exists.
    VersionExists,
    /// Record storage failed.
    StorageError,
    /// No provider is registered for the procedure.
    NoRpcProvider,
    /// Provider reported an error.
    RpcError,
    /// Provider accepted but never responded.
    ResponseTimeout,
}

impl ErrorEvent {
    /// Wire name of the error event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageDenied => "MESSAGE_DENIED",
            Self::InvalidMessage => "INVALID_MESSAGE",
            Self::RecordNotFound => "RECORD_NOT_FOUND",
            Self::VersionExists => "VERSION_EXISTS",
            Self::StorageError => "STORAGE_ERROR",
            Self::NoRpcProvider => "NO_RPC_PROVIDER",
            Self::RpcError => "RPC_ERROR",
            Self::ResponseTimeout => "RESPONSE_TIMEOUT",
        }
    }
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire result of one operation: `{success, ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Remaining fields (`data`, `version`, `error`, ...).
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl OperationResult {
    /// `{success: true}`.
    pub fn ok() -> Self {
        Self {
            success: true,
            fields: Map::new(),
        }
    }

    /// `{success: false, error}`.
    pub fn failed(error: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("error".to_string(), Value::String(error.into()));
        Self {
            success: false,
            fields,
        }
    }

    /// Add a field to the result.
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    /// The `error` field, when present and a string.
    pub fn error(&self) -> Option<&str> {
        self.fields.get("error").and_then(Value::as_str)
    }
}
