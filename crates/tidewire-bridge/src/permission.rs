// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Permission decisions for individual messages.

use async_trait::async_trait;
use thiserror::Error;
use tidewire_protocol::Message;

use crate::auth::AuthContext;
use crate::connection::Connection;

/// The permission provider could not reach a decision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("permission check failed: {0}")]
pub struct PermissionError(pub String);

/// Pluggable permission decision engine.
///
/// Shared by every batch in the process; must tolerate concurrent calls.
#[async_trait]
pub trait PermissionHandler: Send + Sync {
    /// Decide whether the caller of `connection` may send `message`.
    async fn can_perform_action(
        &self,
        auth: &AuthContext,
        message: &Message,
        connection: &dyn Connection,
    ) -> Result<bool, PermissionError>;
}

/// Permits everything, the behaviour of a server with no permissions
/// configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenPermission;

#[async_trait]
impl PermissionHandler for OpenPermission {
    async fn can_perform_action(
        &self,
        _auth: &AuthContext,
        _message: &Message,
        _connection: &dyn Connection,
    ) -> Result<bool, PermissionError> {
        Ok(true)
    }
}
