// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Distribution layer - where permitted messages go.
//!
//! The bridge never executes operations itself. It hands each message to a
//! [`Distributor`] together with the connection replies must be sent to.

pub mod local;
pub mod mock;

use std::sync::Arc;

use tidewire_protocol::Message;

use crate::connection::Connection;

pub use local::LocalDistributor;
pub use mock::MockDistributor;

/// Entry point into the publish/subscribe layer.
///
/// `distribute` must not block: implementations hand the message off and
/// reply later through `connection`. One distributor serves every batch in the
/// process concurrently.
pub trait Distributor: Send + Sync {
    /// Dispatch `message` on behalf of `connection`.
    fn distribute(&self, connection: Arc<dyn Connection>, message: Message);
}
