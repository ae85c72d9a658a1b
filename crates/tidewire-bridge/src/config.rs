// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Tidewire bridge configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Interface the HTTP listener binds to
    pub host: IpAddr,
    /// HTTP listener port
    pub port: u16,
    /// Path answering liveness checks
    pub health_check_path: String,
    /// Path of the token-issuance endpoint
    pub auth_path: String,
    /// Path accepting operation batches
    pub post_path: String,
    /// Reserved read path
    pub get_path: String,
    /// Answer CORS preflights for any origin
    pub allow_all_origins: bool,
    /// Explicit CORS allow list, used when `allow_all_origins` is off
    pub origins: Vec<String>,
    /// Route the token-issuance endpoint
    pub enable_auth_endpoint: bool,
    /// Accept `authData` in batch requests
    pub allow_auth_data: bool,
    /// Include raw credentials in diagnostics for rejected auth material
    pub log_invalid_auth_data: bool,
    /// Deadline for every operation in a batch to resolve
    pub request_timeout: Duration,
    /// Largest accepted request body in bytes
    pub max_body_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 8080,
            health_check_path: "/health-check".to_string(),
            auth_path: "/api/auth".to_string(),
            post_path: "/api".to_string(),
            get_path: "/api".to_string(),
            allow_all_origins: true,
            origins: Vec::new(),
            enable_auth_endpoint: false,
            allow_auth_data: true,
            log_invalid_auth_data: false,
            request_timeout: Duration::from_millis(20_000),
            max_body_size: 1024 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional; unset variables keep the [`Default`] value.
    ///
    /// - `TIDEWIRE_HOST` (default: 0.0.0.0)
    /// - `TIDEWIRE_PORT` (default: 8080)
    /// - `TIDEWIRE_HEALTH_CHECK_PATH` (default: /health-check)
    /// - `TIDEWIRE_AUTH_PATH` (default: /api/auth)
    /// - `TIDEWIRE_POST_PATH` (default: /api)
    /// - `TIDEWIRE_GET_PATH` (default: /api)
    /// - `TIDEWIRE_ALLOW_ALL_ORIGINS` (default: true)
    /// - `TIDEWIRE_ORIGINS`: comma-separated origins (default: empty)
    /// - `TIDEWIRE_ENABLE_AUTH_ENDPOINT` (default: false)
    /// - `TIDEWIRE_ALLOW_AUTH_DATA` (default: true)
    /// - `TIDEWIRE_LOG_INVALID_AUTH_DATA` (default: false)
    /// - `TIDEWIRE_REQUEST_TIMEOUT_MS` (default: 20000)
    /// - `TIDEWIRE_MAX_BODY_SIZE`: bytes (default: 1048576)
    ///
    /// Routes sharing a method must use distinct paths.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = match env("TIDEWIRE_HOST") {
            Some(v) => v
                .parse()
                .map_err(|_| ConfigError::Invalid("TIDEWIRE_HOST", "must be an IP address"))?,
            None => defaults.host,
        };

        let port = match env("TIDEWIRE_PORT") {
            Some(v) => v.parse().map_err(|_| {
                ConfigError::Invalid("TIDEWIRE_PORT", "must be a valid port number")
            })?,
            None => defaults.port,
        };

        let request_timeout_ms: u64 = match env("TIDEWIRE_REQUEST_TIMEOUT_MS") {
            Some(v) => match v.parse() {
                Ok(ms) if ms > 0 => ms,
                _ => {
                    return Err(ConfigError::Invalid(
                        "TIDEWIRE_REQUEST_TIMEOUT_MS",
                        "must be a positive integer",
                    ));
                }
            },
            None => defaults.request_timeout.as_millis() as u64,
        };

        let max_body_size = match env("TIDEWIRE_MAX_BODY_SIZE") {
            Some(v) => match v.parse() {
                Ok(size) if size > 0 => size,
                _ => {
                    return Err(ConfigError::Invalid(
                        "TIDEWIRE_MAX_BODY_SIZE",
                        "must be a positive integer",
                    ));
                }
            },
            None => defaults.max_body_size,
        };

        let origins = env("TIDEWIRE_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let config = Self {
            host,
            port,
            health_check_path: path("TIDEWIRE_HEALTH_CHECK_PATH", defaults.health_check_path)?,
            auth_path: path("TIDEWIRE_AUTH_PATH", defaults.auth_path)?,
            post_path: path("TIDEWIRE_POST_PATH", defaults.post_path)?,
            get_path: path("TIDEWIRE_GET_PATH", defaults.get_path)?,
            allow_all_origins: flag("TIDEWIRE_ALLOW_ALL_ORIGINS", defaults.allow_all_origins)?,
            origins,
            enable_auth_endpoint: flag(
                "TIDEWIRE_ENABLE_AUTH_ENDPOINT",
                defaults.enable_auth_endpoint,
            )?,
            allow_auth_data: flag("TIDEWIRE_ALLOW_AUTH_DATA", defaults.allow_auth_data)?,
            log_invalid_auth_data: flag(
                "TIDEWIRE_LOG_INVALID_AUTH_DATA",
                defaults.log_invalid_auth_data,
            )?,
            request_timeout: Duration::from_millis(request_timeout_ms),
            max_body_size,
        };
        config.check_routes()?;
        Ok(config)
    }

    fn check_routes(&self) -> Result<(), ConfigError> {
        if self.health_check_path == self.get_path {
            return Err(ConfigError::Invalid(
                "TIDEWIRE_HEALTH_CHECK_PATH",
                "must differ from TIDEWIRE_GET_PATH",
            ));
        }
        if self.enable_auth_endpoint && self.auth_path == self.post_path {
            return Err(ConfigError::Invalid(
                "TIDEWIRE_AUTH_PATH",
                "must differ from TIDEWIRE_POST_PATH",
            ));
        }
        Ok(())
    }

    /// Socket address the HTTP listener binds to.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn flag(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env(key).as_deref() {
        None => Ok(default),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(_) => Err(ConfigError::Invalid(key, "must be true, false, 1 or 0")),
    }
}

fn path(key: &'static str, default: String) -> Result<String, ConfigError> {
    match env(key) {
        None => Ok(default),
        Some(v) if v.starts_with('/') => Ok(v),
        Some(_) => Err(ConfigError::Invalid(key, "must start with '/'")),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ALL_VARS: &[&str] = &[
        "TIDEWIRE_HOST",
        "TIDEWIRE_PORT",
        "TIDEWIRE_HEALTH_CHECK_PATH",
        "TIDEWIRE_AUTH_PATH",
        "TIDEWIRE_POST_PATH",
        "TIDEWIRE_GET_PATH",
        "TIDEWIRE_ALLOW_ALL_ORIGINS",
        "TIDEWIRE_ORIGINS",
        "TIDEWIRE_ENABLE_AUTH_ENDPOINT",
        "TIDEWIRE_ALLOW_AUTH_DATA",
        "TIDEWIRE_LOG_INVALID_AUTH_DATA",
        "TIDEWIRE_REQUEST_TIMEOUT_MS",
        "TIDEWIRE_MAX_BODY_SIZE",
    ];

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        /// Start from a clean slate: every bridge variable unset.
        fn clean() -> Self {
            let mut guard = Self { vars: Vec::new() };
            for key in ALL_VARS {
                guard.remove(key);
            }
            guard
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::clean();

        let config = Config::from_env().unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.bind_addr().port(), 8080);
        assert_eq!(config.request_timeout, Duration::from_millis(20_000));
        assert!(config.allow_auth_data);
        assert!(!config.log_invalid_auth_data);
        assert!(!config.enable_auth_endpoint);
    }

    #[test]
    fn test_config_from_env_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("TIDEWIRE_HOST", "127.0.0.1");
        guard.set("TIDEWIRE_PORT", "9999");
        guard.set("TIDEWIRE_POST_PATH", "/batch");
        guard.set("TIDEWIRE_AUTH_PATH", "/login");
        guard.set("TIDEWIRE_ALLOW_ALL_ORIGINS", "false");
        guard.set("TIDEWIRE_ORIGINS", "https://a.example, https://b.example,");
        guard.set("TIDEWIRE_ENABLE_AUTH_ENDPOINT", "1");
        guard.set("TIDEWIRE_ALLOW_AUTH_DATA", "0");
        guard.set("TIDEWIRE_LOG_INVALID_AUTH_DATA", "true");
        guard.set("TIDEWIRE_REQUEST_TIMEOUT_MS", "500");
        guard.set("TIDEWIRE_MAX_BODY_SIZE", "2048");

        let config = Config::from_env().unwrap();

        assert_eq!(config.bind_addr(), "127.0.0.1:9999".parse().unwrap());
        assert_eq!(config.post_path, "/batch");
        assert_eq!(config.auth_path, "/login");
        assert!(!config.allow_all_origins);
        assert_eq!(
            config.origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(config.enable_auth_endpoint);
        assert!(!config.allow_auth_data);
        assert!(config.log_invalid_auth_data);
        assert_eq!(config.request_timeout, Duration::from_millis(500));
        assert_eq!(config.max_body_size, 2048);
    }

    #[test]
    fn test_config_invalid_port() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("TIDEWIRE_PORT", "99999"); // > 65535

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("TIDEWIRE_PORT", _)));
    }

    #[test]
    fn test_config_invalid_timeout() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("TIDEWIRE_REQUEST_TIMEOUT_MS", "0");
        assert!(matches!(
            Config::from_env().unwrap_err(),
            ConfigError::Invalid("TIDEWIRE_REQUEST_TIMEOUT_MS", _)
        ));

        guard.set("TIDEWIRE_REQUEST_TIMEOUT_MS", "soon");
        assert!(Config::from_env().is_err());
    }

    #[test]
    fn test_config_invalid_flag_and_path() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("TIDEWIRE_ALLOW_AUTH_DATA", "yes");
        assert!(matches!(
            Config::from_env().unwrap_err(),
            ConfigError::Invalid("TIDEWIRE_ALLOW_AUTH_DATA", _)
        ));

        guard.remove("TIDEWIRE_ALLOW_AUTH_DATA");
        guard.set("TIDEWIRE_GET_PATH", "api");
        assert!(matches!(
            Config::from_env().unwrap_err(),
            ConfigError::Invalid("TIDEWIRE_GET_PATH", _)
        ));
    }

    #[test]
    fn test_config_rejects_colliding_routes() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("TIDEWIRE_HEALTH_CHECK_PATH", "/api");
        assert!(matches!(
            Config::from_env().unwrap_err(),
            ConfigError::Invalid("TIDEWIRE_HEALTH_CHECK_PATH", _)
        ));

        guard.remove("TIDEWIRE_HEALTH_CHECK_PATH");
        guard.set("TIDEWIRE_AUTH_PATH", "/api");
        // The auth route is only mounted when enabled.
        assert_eq!(Config::from_env().unwrap().auth_path, "/api");

        guard.set("TIDEWIRE_ENABLE_AUTH_ENDPOINT", "true");
        assert!(matches!(
            Config::from_env().unwrap_err(),
            ConfigError::Invalid("TIDEWIRE_AUTH_PATH", _)
        ));

        guard.set("TIDEWIRE_POST_PATH", "/batch");
        assert!(Config::from_env().is_ok());
    }

    #[test]
    fn test_config_error_display() {
        let invalid = ConfigError::Invalid("MY_VAR", "must be a number");
        assert_eq!(
            invalid.to_string(),
            "invalid value for MY_VAR: must be a number"
        );
    }
}
