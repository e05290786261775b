// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bootstrap configuration model.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Top-level chatbridge configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Bearer keys for the consumer and admin route groups.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Defaults for the runtime relay settings.
    #[serde(default)]
    pub relay: RelayConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// Deadline for a single store or rate-limit operation, in milliseconds.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            operation_timeout_ms: default_operation_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("chatbridge").join("chatbridge.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("chatbridge.db"))
        .display()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

fn default_operation_timeout_ms() -> u64 {
    5000
}

/// Bearer keys. A route group whose key is unset rejects every request.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Key for the consumer routes (inbox, outbox).
    #[serde(default)]
    pub api_key: Option<String>,

    /// Key for the admin routes (sessions, cleanup, clear, config).
    #[serde(default)]
    pub admin_key: Option<String>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("admin_key", &self.admin_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Defaults for the runtime settings held in `system_config`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Idle seconds before a session is eligible for cleanup.
    #[serde(default = "default_session_timeout")]
    pub session_timeout: u64,

    /// Maximum message or response length, in characters.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Rate-limit window width, in seconds.
    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window: u64,

    #[serde(default = "default_rate_limit_messages")]
    pub rate_limit_messages: u32,

    #[serde(default = "default_rate_limit_inbox")]
    pub rate_limit_inbox: u32,

    #[serde(default = "default_rate_limit_outbox")]
    pub rate_limit_outbox: u32,

    #[serde(default = "default_rate_limit_responses")]
    pub rate_limit_responses: u32,

    #[serde(default = "default_rate_limit_sessions")]
    pub rate_limit_sessions: u32,

    /// Seconds between background cleanup sweeps; 0 disables the sweeper.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            session_timeout: default_session_timeout(),
            max_message_length: default_max_message_length(),
            rate_limit_window: default_rate_limit_window(),
            rate_limit_messages: default_rate_limit_messages(),
            rate_limit_inbox: default_rate_limit_inbox(),
            rate_limit_outbox: default_rate_limit_outbox(),
            rate_limit_responses: default_rate_limit_responses(),
            rate_limit_sessions: default_rate_limit_sessions(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_session_timeout() -> u64 {
    1800
}

fn default_max_message_length() -> usize {
    chatbridge_core::validate::DEFAULT_MAX_MESSAGE_LENGTH
}

fn default_rate_limit_window() -> u64 {
    3600
}

fn default_rate_limit_messages() -> u32 {
    chatbridge_core::Endpoint::Messages.default_limit()
}

fn default_rate_limit_inbox() -> u32 {
    chatbridge_core::Endpoint::Inbox.default_limit()
}

fn default_rate_limit_outbox() -> u32 {
    chatbridge_core::Endpoint::Outbox.default_limit()
}

fn default_rate_limit_responses() -> u32 {
    chatbridge_core::Endpoint::Responses.default_limit()
}

fn default_rate_limit_sessions() -> u32 {
    chatbridge_core::Endpoint::Sessions.default_limit()
}

fn default_sweep_interval_secs() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_debug_redacts_keys() {
        let auth = AuthConfig {
            api_key: Some("consumer-secret".into()),
            admin_key: None,
        };
        let debug = format!("{auth:?}");
        assert!(!debug.contains("consumer-secret"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("None"));
    }

    #[test]
    fn relay_defaults_match_endpoint_defaults() {
        let relay = RelayConfig::default();
        assert_eq!(relay.session_timeout, 1800);
        assert_eq!(relay.max_message_length, 10_000);
        assert_eq!(relay.rate_limit_window, 3600);
        assert_eq!(relay.rate_limit_messages, 50);
        assert_eq!(relay.rate_limit_sessions, 20);
    }
}
