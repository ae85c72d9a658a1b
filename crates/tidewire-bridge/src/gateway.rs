// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request gateway.
//!
//! Validates the envelope of a batch before anything else happens: the
//! `body` array and the credentials (`authData` or `token`). A rejection here
//! is reported before authentication runs and before any operation is
//! dispatched.

use serde_json::{Map, Value};
use tidewire_protocol::{Codec, ParsedOperation};
use tracing::debug;

use crate::auth::AuthMaterial;
use crate::config::Config;
use crate::error::{BridgeError, Result};

const BODY_MISSING: &str = "Invalid message: the \"body\" parameter must exist.";
const BODY_NOT_ARRAY: &str =
    "Invalid message: the \"body\" parameter must be a non-empty array of Objects.";
const AUTH_DATA_DISABLED: &str =
    "Authentication using authData is disabled. Try using a token instead.";
const AUTH_DATA_NOT_OBJECT: &str = "Invalid message: the \"authData\" parameter must be an object";
const TOKEN_NOT_STRING: &str =
    "Invalid message: the \"token\" parameter must be a non-empty string";

/// Credential handling switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayPolicy {
    /// Whether `authData` may be submitted at all.
    pub allow_auth_data: bool,
    /// Whether rejected credentials are written to logs verbatim.
    pub log_invalid_auth_data: bool,
}

impl Default for GatewayPolicy {
    fn default() -> Self {
        Self {
            allow_auth_data: true,
            log_invalid_auth_data: false,
        }
    }
}

impl From<&Config> for GatewayPolicy {
    fn from(config: &Config) -> Self {
        Self {
            allow_auth_data: config.allow_auth_data,
            log_invalid_auth_data: config.log_invalid_auth_data,
        }
    }
}

/// A batch envelope that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    /// Credentials for the auth gate.
    pub auth_material: AuthMaterial,
    /// Raw operations, still to be decoded.
    pub operations: Vec<Value>,
}

/// Validate a batch envelope.
///
/// A non-object request is treated as one without fields.
pub fn validate_batch(request: &Value, policy: &GatewayPolicy) -> Result<BatchRequest> {
    let empty = Map::new();
    let fields = request.as_object().unwrap_or(&empty);

    let operations = match fields.get("body") {
        None | Some(Value::Null) => return Err(reject(BODY_MISSING, "body", None, policy)),
        Some(Value::Array(ops)) if !ops.is_empty() => ops.clone(),
        Some(other) => return Err(reject(BODY_NOT_ARRAY, "body", Some(other), policy)),
    };

    let auth_material = extract_auth_material(fields, policy)?;

    Ok(BatchRequest {
        auth_material,
        operations,
    })
}

/// Credentials of a request: `authData` wins over `token`; neither means
/// anonymous access.
pub fn extract_auth_material(
    fields: &Map<String, Value>,
    policy: &GatewayPolicy,
) -> Result<AuthMaterial> {
    if let Some(auth_data) = fields.get("authData") {
        if !policy.allow_auth_data {
            return Err(reject(AUTH_DATA_DISABLED, "authData", Some(auth_data), policy));
        }
        return match auth_data {
            Value::Object(material) => Ok(material.clone()),
            other => Err(reject(AUTH_DATA_NOT_OBJECT, "authData", Some(other), policy)),
        };
    }

    if let Some(token) = fields.get("token") {
        return match token {
            Value::String(token) if !token.is_empty() => {
                let mut material = Map::new();
                material.insert("token".to_string(), Value::String(token.clone()));
                Ok(material)
            }
            other => Err(reject(TOKEN_NOT_STRING, "token", Some(other), policy)),
        };
    }

    Ok(Map::new())
}

/// Decode every operation, failing the batch on the first invalid one.
pub fn decode_operations(codec: &dyn Codec, operations: &[Value]) -> Result<Vec<ParsedOperation>> {
    operations
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            codec.decode(raw).map_err(|e| {
                debug!(index, error = %e, "Operation failed to decode");
                BridgeError::BadRequest(format!(
                    "Failed to parse operation at index {}. Reason: {}",
                    index, e
                ))
            })
        })
        .collect()
}

fn reject(
    message: &'static str,
    field: &'static str,
    value: Option<&Value>,
    policy: &GatewayPolicy,
) -> BridgeError {
    // Credentials only reach the log when explicitly enabled.
    let shown = match value {
        Some(v) if field == "body" || policy.log_invalid_auth_data => v.to_string(),
        _ => "-".to_string(),
    };
    debug!(field, value = %shown, "{}", message);
    BridgeError::BadRequest(message.to_string())
}
