// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for tidewire-bridge integration tests.
//!
//! Provides TestContext for building a router over swappable collaborators
//! and driving it with in-memory requests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use tidewire_bridge::{
    AuthContext, AuthMaterial, AuthResponse, AuthenticationHandler, BridgeHandlerState, Config,
    Connection, ConnectionMetadata, Distributor, PermissionError, PermissionHandler,
};
use tidewire_bridge::server::create_router;
use tidewire_protocol::{JsonCodec, Message};

/// Grants tokens starting with `valid-`, counting every call.
#[derive(Default)]
pub struct TokenAuthentication {
    pub calls: AtomicUsize,
}

#[async_trait]
impl AuthenticationHandler for TokenAuthentication {
    async fn is_valid_user(
        &self,
        _metadata: &ConnectionMetadata,
        auth_material: &AuthMaterial,
    ) -> AuthResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match auth_material.get("token").and_then(Value::as_str) {
            Some(token) if token.starts_with("valid-") => AuthResponse::Granted(AuthContext {
                username: Some(token.trim_start_matches("valid-").to_string()),
                token: Some(token.to_string()),
                client_data: None,
                server_data: None,
            }),
            _ => AuthResponse::Denied(Some("Token rejected.".to_string())),
        }
    }
}

/// Denies any message whose name starts with `secret`.
#[derive(Default)]
pub struct NamePermission {
    pub calls: AtomicUsize,
}

#[async_trait]
impl PermissionHandler for NamePermission {
    async fn can_perform_action(
        &self,
        _auth: &AuthContext,
        message: &Message,
        _connection: &dyn Connection,
    ) -> Result<bool, PermissionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(!message.name().is_some_and(|name| name.starts_with("secret")))
    }
}

/// Test context: a router plus handles on its collaborators.
pub struct TestContext {
    pub router: Router,
    pub authentication: Arc<TokenAuthentication>,
    pub permission: Arc<NamePermission>,
}

impl TestContext {
    /// Build a context over `distributor` with `config`.
    pub fn new(distributor: Arc<dyn Distributor>, config: Config) -> Self {
        let authentication = Arc::new(TokenAuthentication::default());
        let permission = Arc::new(NamePermission::default());
        let state = BridgeHandlerState::new(
            authentication.clone(),
            permission.clone(),
            distributor,
            Arc::new(JsonCodec::new()),
            &config,
        );
        let router = create_router(Arc::new(state), &config);

        Self {
            router,
            authentication,
            permission,
        }
    }

    /// POST `body` to `path` and return status plus JSON response.
    pub async fn post(&self, path: &str, body: &Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    /// Number of authentication decisions so far.
    pub fn auth_calls(&self) -> usize {
        self.authentication.calls.load(Ordering::SeqCst)
    }

    /// Number of permission decisions so far.
    pub fn permission_calls(&self) -> usize {
        self.permission.calls.load(Ordering::SeqCst)
    }
}
