// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Authentication gate.
//!
//! A batch is authenticated exactly once, before any of its operations is
//! decoded or dispatched. The resulting [`AuthContext`] is shared read-only by
//! every operation of the batch. The token-issuance endpoint goes through the
//! same gate with a different denial message.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::error::{BridgeError, Result};

/// Credentials submitted with a request: the `authData` object, `{"token": ..}`,
/// or empty for anonymous access.
pub type AuthMaterial = Map<String, Value>;

/// Transport details handed to the authentication provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionMetadata {
    /// Request headers with lower-cased names. Non UTF-8 values are dropped.
    pub headers: BTreeMap<String, String>,
    /// `Referer` header, if sent.
    pub referer: Option<String>,
    /// Peer address when the listener exposes it.
    pub remote_addr: Option<SocketAddr>,
}

/// Identity resolved by the authentication provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthContext {
    /// Authenticated user, if the provider names one.
    pub username: Option<String>,
    /// Token the client can reuse on later requests.
    pub token: Option<String>,
    /// Data returned to the client on token issuance.
    pub client_data: Option<Value>,
    /// Data only visible to server-side providers (permissions).
    pub server_data: Option<Value>,
}

/// Decision of an authentication provider.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthResponse {
    /// Access granted with the resolved identity.
    Granted(AuthContext),
    /// Access denied, optionally with a reason for the client.
    Denied(Option<String>),
}

/// Pluggable authentication decision engine.
///
/// Implementations are shared by every request in the process and must
/// tolerate concurrent calls.
#[async_trait]
pub trait AuthenticationHandler: Send + Sync {
    /// Decide whether `auth_material` identifies a valid user.
    async fn is_valid_user(
        &self,
        metadata: &ConnectionMetadata,
        auth_material: &AuthMaterial,
    ) -> AuthResponse;
}

/// Body of a successful token-issuance response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    /// Issued token.
    pub token: Option<String>,
    /// Provider data for the client.
    pub client_data: Option<Value>,
}

/// Runs the single authentication decision for a request.
#[derive(Clone)]
pub struct AuthGate {
    handler: Arc<dyn AuthenticationHandler>,
}

impl AuthGate {
    /// Create a gate backed by `handler`.
    pub fn new(handler: Arc<dyn AuthenticationHandler>) -> Self {
        Self { handler }
    }

    /// Authenticate a batch. Denial rejects the whole batch.
    #[instrument(skip_all)]
    pub async fn authenticate_batch(
        &self,
        metadata: &ConnectionMetadata,
        auth_material: &AuthMaterial,
    ) -> Result<Arc<AuthContext>> {
        match self.handler.is_valid_user(metadata, auth_material).await {
            AuthResponse::Granted(context) => {
                debug!(username = ?context.username, "Batch authenticated");
                Ok(Arc::new(context))
            }
            AuthResponse::Denied(reason) => {
                debug!(reason = ?reason, "Batch authentication denied");
                Err(BridgeError::Unauthorized(reason.unwrap_or_else(|| {
                    "Unsuccessful authentication attempt.".to_string()
                })))
            }
        }
    }

    /// Authenticate a token-issuance request.
    #[instrument(skip_all)]
    pub async fn issue_token(
        &self,
        metadata: &ConnectionMetadata,
        auth_material: &AuthMaterial,
    ) -> Result<TokenGrant> {
        match self.handler.is_valid_user(metadata, auth_material).await {
            AuthResponse::Granted(context) => {
                debug!(username = ?context.username, "Token issued");
                Ok(TokenGrant {
                    token: context.token,
                    client_data: context.client_data,
                })
            }
            AuthResponse::Denied(reason) => {
                debug!(reason = ?reason, "Token request denied");
                Err(BridgeError::Unauthorized(
                    reason.unwrap_or_else(|| "Invalid authentication data.".to_string()),
                ))
            }
        }
    }
}

/// Grants every request, the behaviour of a server with no authentication
/// configured.
///
/// The username is taken from `authData.username` when present, `OPEN`
/// otherwise. A submitted token is echoed back; a fresh one is minted for
/// requests without a token.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAuthentication;

#[async_trait]
impl AuthenticationHandler for OpenAuthentication {
    async fn is_valid_user(
        &self,
        _metadata: &ConnectionMetadata,
        auth_material: &AuthMaterial,
    ) -> AuthResponse {
        let username = auth_material
            .get("username")
            .and_then(Value::as_str)
            .unwrap_or("OPEN")
            .to_string();
        let token = auth_material
            .get("token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        AuthResponse::Granted(AuthContext {
            username: Some(username),
            token: Some(token),
            client_data: None,
            server_data: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct DenyingAuthentication(Option<&'static str>);

    #[async_trait]
    impl AuthenticationHandler for DenyingAuthentication {
        async fn is_valid_user(
            &self,
            _metadata: &ConnectionMetadata,
            _auth_material: &AuthMaterial,
        ) -> AuthResponse {
            AuthResponse::Denied(self.0.map(str::to_string))
        }
    }

    fn material(value: Value) -> AuthMaterial {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_batch_denial_messages() {
        let gate = AuthGate::new(Arc::new(DenyingAuthentication(None)));
        let err = gate
            .authenticate_batch(&ConnectionMetadata::default(), &AuthMaterial::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::Unauthorized("Unsuccessful authentication attempt.".to_string())
        );

        let gate = AuthGate::new(Arc::new(DenyingAuthentication(Some("expired token"))));
        let err = gate
            .authenticate_batch(&ConnectionMetadata::default(), &AuthMaterial::new())
            .await
            .unwrap_err();
        assert_eq!(err, BridgeError::Unauthorized("expired token".to_string()));
    }

    #[tokio::test]
    async fn test_token_denial_message() {
        let gate = AuthGate::new(Arc::new(DenyingAuthentication(None)));
        let err = gate
            .issue_token(&ConnectionMetadata::default(), &AuthMaterial::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::Unauthorized("Invalid authentication data.".to_string())
        );
    }

    #[tokio::test]
    async fn test_open_authentication_uses_username_and_token() {
        let gate = AuthGate::new(Arc::new(OpenAuthentication));

        let context = gate
            .authenticate_batch(
                &ConnectionMetadata::default(),
                &material(json!({"username": "ada"})),
            )
            .await
            .unwrap();
        assert_eq!(context.username.as_deref(), Some("ada"));
        assert!(context.token.is_some());

        let grant = gate
            .issue_token(
                &ConnectionMetadata::default(),
                &material(json!({"token": "abc"})),
            )
            .await
            .unwrap();
        assert_eq!(grant.token.as_deref(), Some("abc"));
        assert_eq!(
            serde_json::to_value(&grant).unwrap(),
            json!({"token": "abc", "clientData": null})
        );
    }

    #[tokio::test]
    async fn test_open_authentication_anonymous() {
        let context = OpenAuthentication
            .is_valid_user(&ConnectionMetadata::default(), &AuthMaterial::new())
            .await;
        match context {
            AuthResponse::Granted(ctx) => assert_eq!(ctx.username.as_deref(), Some("OPEN")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
