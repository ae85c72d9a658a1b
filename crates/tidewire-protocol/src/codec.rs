// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Translation between the public JSON operation shape and [`Message`].
//!
//! A decoded operation carries an [`OperationKind`]: terminal operations wait
//! for a reply from the messaging layer, fire-and-forget operations only need
//! a permission decision.
//!
//! Wire shape of an operation:
//!
//! ```json
//! { "topic": "record", "action": "write", "recordName": "user/1", "data": {"age": 3} }
//! ```

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::message::{
    ErrorEvent, EventMessage, Message, OperationResult, PresenceMessage, RecordMessage,
    RpcMessage, Topic,
};

/// Errors produced while decoding a raw operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// The operation is not a JSON object.
    #[error("operation must be an object")]
    NotAnObject,

    /// A required field is missing.
    #[error("missing required field \"{0}\"")]
    MissingField(&'static str),

    /// A field is present but has the wrong shape.
    #[error("field \"{field}\" {reason}")]
    InvalidField {
        /// Offending field.
        field: &'static str,
        /// What was expected.
        reason: &'static str,
    },

    /// `topic` names no known topic.
    #[error("unknown topic \"{0}\"")]
    UnknownTopic(String),

    /// `action` is not supported for the topic.
    #[error("unknown action \"{action}\" for topic \"{topic}\"")]
    UnknownAction {
        /// Topic of the operation.
        topic: Topic,
        /// Unsupported action.
        action: String,
    },
}

/// Whether the bridge must wait for a reply to an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// A reply or error arrives asynchronously through a connection.
    Terminal,
    /// Only a permission decision is needed.
    FireAndForget,
}

/// One decoded operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOperation {
    /// Reply expectation.
    pub kind: OperationKind,
    /// Internal message to dispatch.
    pub message: Message,
}

impl ParsedOperation {
    /// Whether the operation expects a reply.
    pub fn is_terminal(&self) -> bool {
        self.kind == OperationKind::Terminal
    }
}

/// A reply or error translated back into wire form.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedResult {
    /// Only terminal results resolve an operation.
    pub terminal: bool,
    /// Wire result.
    pub result: OperationResult,
}

impl EncodedResult {
    fn terminal(result: OperationResult) -> Self {
        Self {
            terminal: true,
            result,
        }
    }
}

/// Bidirectional translator between wire JSON and internal messages.
pub trait Codec: Send + Sync {
    /// Decode one raw operation.
    fn decode(&self, raw: &Value) -> Result<ParsedOperation, CodecError>;

    /// Translate a reply; `None` for messages that are not replies.
    fn encode(&self, reply: &Message) -> Option<EncodedResult>;

    /// Translate an error reported for `message`.
    fn encode_error(&self, message: &Message, event: ErrorEvent, reason: &str) -> EncodedResult;
}

/// The JSON codec used by the HTTP bridge.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self
    }
}

impl Codec for JsonCodec {
    fn decode(&self, raw: &Value) -> Result<ParsedOperation, CodecError> {
        let obj = raw.as_object().ok_or(CodecError::NotAnObject)?;

        let topic_name = required_str(obj, "topic")?;
        let topic: Topic = topic_name.parse().map_err(CodecError::UnknownTopic)?;
        let action = required_str(obj, "action")?;

        let message = match topic {
            Topic::Event => decode_event(obj, action)?,
            Topic::Record => decode_record(obj, action)?,
            Topic::Rpc => decode_rpc(obj, action)?,
            Topic::Presence => decode_presence(obj, action)?,
        };

        let kind = match message {
            Message::Event(_) => OperationKind::FireAndForget,
            Message::Record(_) | Message::Rpc(_) | Message::Presence(_) => OperationKind::Terminal,
        };

        Ok(ParsedOperation { kind, message })
    }

    fn encode(&self, reply: &Message) -> Option<EncodedResult> {
        let result = match reply {
            Message::Record(RecordMessage::ReadResponse { version, data, .. }) => {
                OperationResult::ok()
                    .with("data", data.clone())
                    .with("version", json!(version))
            }
            Message::Record(RecordMessage::HeadResponse { version, .. }) => {
                OperationResult::ok().with("version", json!(version))
            }
            Message::Record(
                RecordMessage::WriteAck { .. }
                | RecordMessage::NotifyAck
                | RecordMessage::DeleteAck { .. },
            ) => OperationResult::ok(),
            Message::Rpc(RpcMessage::Response { data, .. }) => {
                OperationResult::ok().with("data", data.clone().unwrap_or(Value::Null))
            }
            Message::Rpc(RpcMessage::Accept { .. }) => {
                return Some(EncodedResult {
                    terminal: false,
                    result: OperationResult::ok(),
                });
            }
            Message::Presence(PresenceMessage::QueryResponse { users }) => {
                OperationResult::ok().with("users", json!(users))
            }
            Message::Event(_)
            | Message::Record(
                RecordMessage::Read { .. }
                | RecordMessage::Head { .. }
                | RecordMessage::Write { .. }
                | RecordMessage::Notify { .. }
                | RecordMessage::Delete { .. },
            )
            | Message::Rpc(RpcMessage::Request { .. })
            | Message::Presence(PresenceMessage::Query { .. }) => return None,
        };

        Some(EncodedResult::terminal(result))
    }

    fn encode_error(&self, message: &Message, event: ErrorEvent, reason: &str) -> EncodedResult {
        EncodedResult::terminal(
            OperationResult::failed(reason)
                .with("errorTopic", json!(message.topic().as_str()))
                .with("errorEvent", json!(event.as_str())),
        )
    }
}

// ============================================================================
// Per-topic decoding
// ============================================================================

fn decode_event(obj: &Map<String, Value>, action: &str) -> Result<Message, CodecError> {
    match action {
        "emit" => Ok(Message::Event(EventMessage::Emit {
            name: optional_name(obj, "eventName")?,
            data: obj.get("data").cloned(),
        })),
        other => Err(unknown_action(Topic::Event, other)),
    }
}

fn decode_record(obj: &Map<String, Value>, action: &str) -> Result<Message, CodecError> {
    let record = match action {
        "read" => RecordMessage::Read {
            name: required_name(obj, "recordName")?,
        },
        "head" => RecordMessage::Head {
            name: required_name(obj, "recordName")?,
        },
        "write" => RecordMessage::Write {
            name: required_name(obj, "recordName")?,
            data: obj
                .get("data")
                .cloned()
                .ok_or(CodecError::MissingField("data"))?,
            path: optional_str(obj, "path")?,
            version: optional_version(obj)?,
        },
        "notify" => {
            let names = optional_names(obj, "recordNames")?
                .ok_or(CodecError::MissingField("recordNames"))?;
            if names.is_empty() {
                return Err(CodecError::InvalidField {
                    field: "recordNames",
                    reason: "must not be empty",
                });
            }
            RecordMessage::Notify { names }
        }
        "delete" => RecordMessage::Delete {
            name: required_name(obj, "recordName")?,
        },
        other => return Err(unknown_action(Topic::Record, other)),
    };
    Ok(Message::Record(record))
}

fn decode_rpc(obj: &Map<String, Value>, action: &str) -> Result<Message, CodecError> {
    match action {
        "make" => Ok(Message::Rpc(RpcMessage::Request {
            name: required_name(obj, "rpcName")?,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            data: obj.get("data").cloned(),
        })),
        other => Err(unknown_action(Topic::Rpc, other)),
    }
}

fn decode_presence(obj: &Map<String, Value>, action: &str) -> Result<Message, CodecError> {
    match action {
        "query" => Ok(Message::Presence(PresenceMessage::Query {
            names: optional_names(obj, "names")?,
        })),
        other => Err(unknown_action(Topic::Presence, other)),
    }
}

// ============================================================================
// Field helpers
// ============================================================================

fn unknown_action(topic: Topic, action: &str) -> CodecError {
    CodecError::UnknownAction {
        topic,
        action: action.to_string(),
    }
}

fn required_str<'a>(
    obj: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, CodecError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(CodecError::MissingField(field)),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(CodecError::InvalidField {
            field,
            reason: "must be a string",
        }),
    }
}

fn required_name(obj: &Map<String, Value>, field: &'static str) -> Result<String, CodecError> {
    let name = required_str(obj, field)?;
    if name.is_empty() {
        return Err(CodecError::InvalidField {
            field,
            reason: "must be a non-empty string",
        });
    }
    Ok(name.to_string())
}

fn optional_name(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, CodecError> {
    match optional_str(obj, field)? {
        Some(name) if name.is_empty() => Err(CodecError::InvalidField {
            field,
            reason: "must be a non-empty string",
        }),
        name => Ok(name),
    }
}

fn optional_str(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, CodecError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(CodecError::InvalidField {
            field,
            reason: "must be a string",
        }),
    }
}

fn optional_version(obj: &Map<String, Value>) -> Result<i64, CodecError> {
    match obj.get("version") {
        None | Some(Value::Null) => Ok(-1),
        Some(v) => match v.as_i64() {
            Some(version) if version >= -1 => Ok(version),
            _ => Err(CodecError::InvalidField {
                field: "version",
                reason: "must be an integer greater than or equal to -1",
            }),
        },
    }
}

fn optional_names(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<Vec<String>>, CodecError> {
    let invalid = CodecError::InvalidField {
        field,
        reason: "must be an array of strings",
    };
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(|| invalid.clone()))
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(invalid),
    }
}
