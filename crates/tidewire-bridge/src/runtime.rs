// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for tidewire-bridge.
//!
//! This module provides [`BridgeRuntime`] which runs the HTTP bridge inside an
//! existing tokio application instead of as a standalone server.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tidewire_bridge::runtime::BridgeRuntime;
//! use tidewire_bridge::{LocalDistributor, OpenAuthentication, OpenPermission};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = BridgeRuntime::builder()
//!         .authentication(Arc::new(OpenAuthentication))
//!         .permission(Arc::new(OpenPermission))
//!         .distributor(Arc::new(LocalDistributor::new()))
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... run your application ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tidewire_protocol::{Codec, JsonCodec};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::auth::AuthenticationHandler;
use crate::config::Config;
use crate::distribution::Distributor;
use crate::handlers::BridgeHandlerState;
use crate::permission::PermissionHandler;
use crate::server::{create_router, run_server};

/// Builder for creating a [`BridgeRuntime`].
#[derive(Default)]
pub struct BridgeRuntimeBuilder {
    authentication: Option<Arc<dyn AuthenticationHandler>>,
    permission: Option<Arc<dyn PermissionHandler>>,
    distributor: Option<Arc<dyn Distributor>>,
    codec: Option<Arc<dyn Codec>>,
    config: Config,
}

impl std::fmt::Debug for BridgeRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeRuntimeBuilder")
            .field("authentication", &self.authentication.as_ref().map(|_| "..."))
            .field("permission", &self.permission.as_ref().map(|_| "..."))
            .field("distributor", &self.distributor.as_ref().map(|_| "..."))
            .field("codec", &self.codec.as_ref().map(|_| "..."))
            .field("config", &self.config)
            .finish()
    }
}

impl BridgeRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the authentication provider (required).
    pub fn authentication(mut self, authentication: Arc<dyn AuthenticationHandler>) -> Self {
        self.authentication = Some(authentication);
        self
    }

    /// Set the permission provider (required).
    pub fn permission(mut self, permission: Arc<dyn PermissionHandler>) -> Self {
        self.permission = Some(permission);
        self
    }

    /// Set the distribution layer (required).
    pub fn distributor(mut self, distributor: Arc<dyn Distributor>) -> Self {
        self.distributor = Some(distributor);
        self
    }

    /// Set the operation codec.
    ///
    /// Default: [`JsonCodec`]
    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Set the configuration.
    ///
    /// Default: [`Config::default`]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<BridgeRuntimeConfig> {
        let authentication = self
            .authentication
            .ok_or_else(|| anyhow::anyhow!("authentication is required"))?;
        let permission = self
            .permission
            .ok_or_else(|| anyhow::anyhow!("permission is required"))?;
        let distributor = self
            .distributor
            .ok_or_else(|| anyhow::anyhow!("distributor is required"))?;
        let codec = self.codec.unwrap_or_else(|| Arc::new(JsonCodec::new()));

        let state = BridgeHandlerState::new(
            authentication,
            permission,
            distributor,
            codec,
            &self.config,
        );

        Ok(BridgeRuntimeConfig {
            state: Arc::new(state),
            config: self.config,
        })
    }
}

/// Configuration for a [`BridgeRuntime`].
pub struct BridgeRuntimeConfig {
    state: Arc<BridgeHandlerState>,
    config: Config,
}

impl std::fmt::Debug for BridgeRuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeRuntimeConfig")
            .field("state", &"...")
            .field("config", &self.config)
            .finish()
    }
}

impl BridgeRuntimeConfig {
    /// Bind the listener and spawn the HTTP server task.
    pub async fn start(self) -> Result<BridgeRuntime> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let local_addr = listener.local_addr()?;
        let router = create_router(Arc::clone(&self.state), &self.config);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let server_handle = tokio::spawn(run_server(listener, router, shutdown_rx));

        info!(addr = %local_addr, "BridgeRuntime started");

        Ok(BridgeRuntime {
            server_handle,
            shutdown_tx,
            state: self.state,
            local_addr,
        })
    }
}

/// A running bridge that can be embedded in an application.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination; in-flight
/// batches are answered before the server task ends.
pub struct BridgeRuntime {
    server_handle: JoinHandle<std::io::Result<()>>,
    shutdown_tx: watch::Sender<bool>,
    state: Arc<BridgeHandlerState>,
    local_addr: SocketAddr,
}

impl BridgeRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> BridgeRuntimeBuilder {
        BridgeRuntimeBuilder::new()
    }

    /// Address the server is listening on, with the OS-assigned port.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared handler state.
    pub fn state(&self) -> &Arc<BridgeHandlerState> {
        &self.state
    }

    /// Gracefully shut down the runtime.
    pub async fn shutdown(self) -> Result<()> {
        info!("BridgeRuntime shutting down...");

        let _ = self.shutdown_tx.send(true);

        match self.server_handle.await {
            Ok(Ok(())) => {
                info!("BridgeRuntime shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("BridgeRuntime server error during shutdown: {}", e);
                Err(e.into())
            }
            Err(e) => {
                error!("BridgeRuntime server task panicked: {}", e);
                Err(anyhow::anyhow!("server task panicked: {}", e))
            }
        }
    }

    /// Check if the runtime is still running.
    pub fn is_running(&self) -> bool {
        !self.server_handle.is_finished()
    }
}
