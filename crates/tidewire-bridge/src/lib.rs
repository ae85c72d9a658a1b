// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tidewire Bridge - HTTP batch gateway for a realtime messaging layer
//!
//! Clients without a persistent connection POST a batch of operations. The
//! bridge authenticates the batch once, dispatches every operation into the
//! publish/subscribe layer, and answers with one ordered response once every
//! operation has resolved or the batch timeout has elapsed.
//!
//! # Architecture
//!
//! ```text
//!   POST {postPath}
//!        │
//!        ▼
//! ┌───────────────┐  400   ┌──────────────┐  401   ┌──────────────┐  400
//! │    Gateway    │──────▶ │  Auth Gate   │──────▶ │    Codec     │──────▶
//! │ body/authData │        │ once / batch │        │ decode all   │
//! └───────────────┘        └──────────────┘        └──────┬───────┘
//!                                                         │
//!                                                         ▼
//!                                           ┌───────────────────────────┐
//!                                           │     Batch Correlator      │
//!                                           │  slots + timer + responder│
//!                                           │ permission check per op   │
//!                                           └──────┬─────────────┬──────┘
//!                         fire-and-forget:                       │ terminal:
//!                         DetachedConnection                     │ VirtualConnection
//!                                  ▼                             ▼
//!                           ┌─────────────────────────────────────────┐
//!                           │        Distributor (pub/sub layer)      │
//!                           └─────────────────────────────────────────┘
//! ```
//!
//! # HTTP Surface
//!
//! | Route | Response |
//! |-------|----------|
//! | `POST {postPath}` | `200 {result, body}` or `4xx {statusCode, message}` |
//! | `POST {authPath}` | `200 {token, clientData}` or `401` (only when enabled) |
//! | `GET {getPath}` | `501`, reserved |
//! | `GET {healthCheckPath}` | `200 {"status": "ok"}` |
//!
//! # Batch Results
//!
//! | `result` | Meaning |
//! |----------|---------|
//! | `SUCCESS` | every operation succeeded |
//! | `PARTIAL_SUCCESS` | some operations succeeded |
//! | `FAILURE` | no operation succeeded |
//!
//! Operations still unresolved when `requestTimeout` elapses fail with
//! `Request exceeded timeout before a response was received.`; the batch is
//! still answered with a normal envelope.
//!
//! # Configuration
//!
//! Configuration is loaded from `TIDEWIRE_*` environment variables, see
//! [`config::Config`].
//!
//! # Modules
//!
//! - [`config`]: Server configuration from environment variables
//! - [`error`]: Request-level error types rendered as HTTP responses
//! - [`gateway`]: Envelope validation
//! - [`auth`]: Authentication gate and provider trait
//! - [`permission`]: Permission provider trait
//! - [`correlator`]: Batch state machine
//! - [`connection`]: Virtual connections routing replies to slots
//! - [`distribution`]: Distribution layer trait and implementations
//! - [`handlers`]: Transport-independent request handlers
//! - [`server`]: axum router and server loop
//! - [`runtime`]: Embeddable runtime

#![deny(missing_docs)]

/// Authentication gate and provider trait.
pub mod auth;

/// Server configuration loaded from environment variables.
pub mod config;

/// Addressable endpoints handed to the distribution layer.
pub mod connection;

/// Batch correlation engine.
pub mod correlator;

/// Distribution layer.
pub mod distribution;

/// Request-level error types.
pub mod error;

/// Batch envelope validation.
pub mod gateway;

/// Request handlers.
pub mod handlers;

/// Permission provider trait.
pub mod permission;

/// Embeddable runtime.
pub mod runtime;

/// HTTP server.
pub mod server;

pub use auth::{
    AuthContext, AuthGate, AuthMaterial, AuthResponse, AuthenticationHandler, ConnectionMetadata,
    OpenAuthentication, TokenGrant,
};
pub use config::{Config, ConfigError};
pub use connection::{Connection, DetachedConnection, SlotUpdate, VirtualConnection};
pub use correlator::{
    AggregateResult, BatchCorrelator, BatchOutcome, BatchResponse, BatchState, Responder,
    SlotState, aggregate,
};
pub use distribution::{Distributor, LocalDistributor, MockDistributor};
pub use error::{BridgeError, Result};
pub use handlers::BridgeHandlerState;
pub use permission::{OpenPermission, PermissionError, PermissionHandler};
pub use runtime::{BridgeRuntime, BridgeRuntimeBuilder};
