// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Lookup order: `./chatbridge.toml` > `~/.config/chatbridge/chatbridge.toml`
//! > `/etc/chatbridge/chatbridge.toml`, with `CHATBRIDGE_` environment
//! variable overrides on top.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::BridgeConfig;

/// System-wide config file.
pub const SYSTEM_CONFIG_FILE: &str = "/etc/chatbridge/chatbridge.toml";

/// Config file in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "chatbridge.toml";

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "CHATBRIDGE_";

/// Top-level sections that env keys are split on.
const SECTIONS: &[&str] = &["server", "storage", "auth", "relay"];

/// `~/.config/chatbridge/chatbridge.toml`, if a config dir exists.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("chatbridge/chatbridge.toml"))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/chatbridge/chatbridge.toml`
/// 3. `~/.config/chatbridge/chatbridge.toml`
/// 4. `./chatbridge.toml`
/// 5. `CHATBRIDGE_*` environment variables
pub fn load_config() -> Result<BridgeConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<BridgeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BridgeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<BridgeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BridgeConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment used by [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(BridgeConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_FILE))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

/// Environment provider with explicit section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` so that key names
/// containing underscores survive: `CHATBRIDGE_RELAY_RATE_LIMIT_INBOX` maps to
/// `relay.rate_limit_inbox`, not `relay.rate.limit.inbox`.
fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).map(|key| map_env_key(&key.as_str().to_ascii_lowercase()).into())
}

/// Map a lowercased, prefix-stripped env key to a dotted figment path.
fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_on_first_section_only() {
        assert_eq!(map_env_key("server_port"), "server.port");
        assert_eq!(map_env_key("auth_admin_key"), "auth.admin_key");
        assert_eq!(
            map_env_key("relay_rate_limit_inbox"),
            "relay.rate_limit_inbox"
        );
        assert_eq!(
            map_env_key("storage_operation_timeout_ms"),
            "storage.operation_timeout_ms"
        );
    }

    #[test]
    fn unknown_env_sections_pass_through() {
        assert_eq!(map_env_key("bogus_key"), "bogus_key");
        assert_eq!(map_env_key("serverport"), "serverport");
    }
}
