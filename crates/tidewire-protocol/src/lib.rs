// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tidewire Protocol - message model and JSON wire codec
//!
//! This crate defines what travels between the HTTP bridge and the realtime
//! messaging layer:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    tidewire-protocol                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Codec: wire JSON operation  ⇄  internal Message            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Message: event / record / rpc / presence (closed union)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Operations
//!
//! | Topic | Action | Kind |
//! |-------|--------|------|
//! | `event` | `emit` | fire-and-forget |
//! | `record` | `read`, `head`, `write`, `notify`, `delete` | terminal |
//! | `rpc` | `make` | terminal |
//! | `presence` | `query` | terminal |
//!
//! # Usage
//!
//! ```
//! use serde_json::json;
//! use tidewire_protocol::{Codec, JsonCodec, OperationKind};
//!
//! let op = JsonCodec::new()
//!     .decode(&json!({"topic": "event", "action": "emit", "eventName": "news"}))
//!     .unwrap();
//! assert_eq!(op.kind, OperationKind::FireAndForget);
//! ```

pub mod codec;
pub mod message;

pub use codec::{Codec, CodecError, EncodedResult, JsonCodec, OperationKind, ParsedOperation};
pub use message::{
    ErrorEvent, EventMessage, Message, OperationResult, PresenceMessage, RecordMessage,
    RpcMessage, Topic,
};
