// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tidewire Bridge - standalone HTTP gateway
//!
//! Runs the bridge against the in-process distributor with open
//! authentication and permissions. Deployments with real providers embed
//! [`tidewire_bridge::BridgeRuntime`] instead.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tidewire_bridge::config::Config;
use tidewire_bridge::{BridgeRuntime, LocalDistributor, OpenAuthentication, OpenPermission};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tidewire_bridge=info")),
        )
        .init();

    info!("Starting Tidewire Bridge");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        addr = %config.bind_addr(),
        post_path = %config.post_path,
        timeout_ms = config.request_timeout.as_millis() as u64,
        auth_endpoint = config.enable_auth_endpoint,
        "Configuration loaded"
    );

    let runtime = BridgeRuntime::builder()
        .authentication(Arc::new(OpenAuthentication))
        .permission(Arc::new(OpenPermission))
        .distributor(Arc::new(LocalDistributor::new()))
        .config(config)
        .build()?
        .start()
        .await?;

    info!(addr = %runtime.local_addr(), "Tidewire Bridge listening");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    runtime.shutdown().await?;
    info!("Shutdown complete");

    Ok(())
}
