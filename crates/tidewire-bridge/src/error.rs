// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for tidewire-bridge.
//!
//! Batch-level failures short-circuit a request and render as
//! `{statusCode, message}`. Per-operation failures never surface here; they
//! are recorded in the operation's slot instead.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Result type using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that abort a whole request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum BridgeError {
    /// Malformed body, batch, auth material or operation.
    #[error("{0}")]
    BadRequest(String),

    /// The authentication provider denied the request.
    #[error("{0}")]
    Unauthorized(String),

    /// Request body exceeded the configured limit.
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Endpoint is reserved but has no behaviour yet.
    #[error("{0}")]
    NotImplemented(String),

    /// A slot reached aggregation without being resolved.
    #[error("operation at index {index} was never resolved")]
    UnresolvedSlot {
        /// Position of the slot in the batch.
        index: usize,
    },

    /// The batch task stopped without producing a response.
    #[error("{0}")]
    Internal(String),
}

impl BridgeError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::UnresolvedSlot { .. } | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            Self::NotImplemented(_) => "NOT_IMPLEMENTED",
            Self::UnresolvedSlot { .. } => "UNRESOLVED_SLOT",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "statusCode": status.as_u16(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
