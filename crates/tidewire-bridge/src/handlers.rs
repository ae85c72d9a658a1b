// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request handlers for tidewire-bridge.
//!
//! Transport-independent: each handler takes the parsed JSON body and the
//! connection metadata, and returns the response body or a [`BridgeError`].

use std::sync::Arc;

use serde_json::{Map, Value};
use tidewire_protocol::Codec;
use tracing::{debug, info, instrument};

use crate::auth::{AuthGate, AuthenticationHandler, ConnectionMetadata, TokenGrant};
use crate::config::Config;
use crate::correlator::{BatchCorrelator, BatchResponse};
use crate::distribution::Distributor;
use crate::error::Result;
use crate::gateway::{self, GatewayPolicy};
use crate::permission::PermissionHandler;

/// Shared state for bridge handlers.
#[derive(Clone)]
pub struct BridgeHandlerState {
    /// Authentication gate.
    pub gate: AuthGate,
    /// Operation codec.
    pub codec: Arc<dyn Codec>,
    /// Batch engine.
    pub correlator: BatchCorrelator,
    /// Credential handling switches.
    pub policy: GatewayPolicy,
}

impl BridgeHandlerState {
    /// Wire the collaborators together using the limits from `config`.
    pub fn new(
        authentication: Arc<dyn AuthenticationHandler>,
        permission: Arc<dyn PermissionHandler>,
        distributor: Arc<dyn Distributor>,
        codec: Arc<dyn Codec>,
        config: &Config,
    ) -> Self {
        Self {
            gate: AuthGate::new(authentication),
            correlator: BatchCorrelator::new(
                permission,
                distributor,
                Arc::clone(&codec),
                config.request_timeout,
            ),
            codec,
            policy: GatewayPolicy::from(config),
        }
    }
}

// ============================================================================
// Batch
// ============================================================================

/// Handle a batch request.
///
/// Validation, authentication and decoding all complete before the first
/// operation is dispatched.
#[instrument(skip_all, fields(remote = ?metadata.remote_addr))]
pub async fn handle_batch(
    state: &BridgeHandlerState,
    metadata: &ConnectionMetadata,
    request: Value,
) -> Result<BatchResponse> {
    let batch = gateway::validate_batch(&request, &state.policy)?;
    let auth = state
        .gate
        .authenticate_batch(metadata, &batch.auth_material)
        .await?;
    let operations = gateway::decode_operations(state.codec.as_ref(), &batch.operations)?;

    debug!(operations = operations.len(), "Dispatching batch");
    let response = state.correlator.execute(auth, operations).await?;
    info!(result = ?response.result, operations = response.body.len(), "Batch answered");
    Ok(response)
}

// ============================================================================
// Token issuance
// ============================================================================

/// Handle a token-issuance request: `{authData?, token?}`.
#[instrument(skip_all, fields(remote = ?metadata.remote_addr))]
pub async fn handle_token(
    state: &BridgeHandlerState,
    metadata: &ConnectionMetadata,
    request: Value,
) -> Result<TokenGrant> {
    let empty = Map::new();
    let fields = request.as_object().unwrap_or(&empty);
    let material = gateway::extract_auth_material(fields, &state.policy)?;
    state.gate.issue_token(metadata, &material).await
}
