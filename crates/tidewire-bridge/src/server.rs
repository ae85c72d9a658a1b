// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP server for tidewire-bridge.
//!
//! Routes (paths configurable):
//! - `GET  {healthCheckPath}` - liveness check
//! - `POST {postPath}` - batch of operations
//! - `GET  {getPath}` - reserved, answers 501
//! - `POST {authPath}` - token issuance, only when enabled

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, DefaultBodyLimit, FromRequest, Request, State};
use axum::http::header::{HeaderMap, REFERER};
use axum::http::{HeaderValue, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument, warn};

use crate::auth::{ConnectionMetadata, TokenGrant};
use crate::config::Config;
use crate::correlator::BatchResponse;
use crate::error::{BridgeError, Result};
use crate::handlers::{self, BridgeHandlerState};

/// Shared state for the HTTP server
pub type BridgeServerState = BridgeHandlerState;

/// Build the router for `config`.
pub fn create_router(state: Arc<BridgeServerState>, config: &Config) -> Router {
    let mut router = Router::new()
        .route(&config.health_check_path, get(health_check))
        .route(&config.post_path, post(post_batch))
        .route(&config.get_path, get(get_batch));

    if config.enable_auth_endpoint {
        router = router.route(&config.auth_path, post(post_auth));
    }

    router
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_body_size))
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.allow_all_origins {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

/// Serve `router` on `listener` until `shutdown` flips to true.
#[instrument(skip_all, fields(addr = ?listener.local_addr().ok()))]
pub async fn run_server(
    listener: TcpListener,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    info!("HTTP server starting");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        while shutdown.changed().await.is_ok() {
            if *shutdown.borrow() {
                break;
            }
        }
        info!("HTTP server received shutdown signal");
    })
    .await?;

    info!("HTTP server stopped");
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_check() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn post_batch(
    State(state): State<Arc<BridgeServerState>>,
    request: Request,
) -> Result<Json<BatchResponse>> {
    let (metadata, body) = read_request(request).await?;
    handlers::handle_batch(&state, &metadata, body).await.map(Json)
}

async fn post_auth(
    State(state): State<Arc<BridgeServerState>>,
    request: Request,
) -> Result<Json<TokenGrant>> {
    let (metadata, body) = read_request(request).await?;
    handlers::handle_token(&state, &metadata, body).await.map(Json)
}

async fn get_batch() -> BridgeError {
    BridgeError::NotImplemented("GET requests are not supported.".to_string())
}

/// Connection metadata plus the JSON body of a request.
async fn read_request(request: Request) -> Result<(ConnectionMetadata, Value)> {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let metadata = connection_metadata(request.headers(), remote_addr);

    let bytes = Bytes::from_request(request, &()).await.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            BridgeError::PayloadTooLarge(rejection.body_text())
        } else {
            BridgeError::BadRequest(rejection.body_text())
        }
    })?;

    let body = serde_json::from_slice(&bytes).map_err(|e| {
        debug!(error = %e, "Request body is not JSON");
        BridgeError::BadRequest("Failed to parse body of request.".to_string())
    })?;

    Ok((metadata, body))
}

fn connection_metadata(headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> ConnectionMetadata {
    let headers_map: BTreeMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let referer = headers
        .get(REFERER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    ConnectionMetadata {
        headers: headers_map,
        referer,
        remote_addr,
    }
}
