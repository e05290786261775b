// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde attributes cannot express. All errors
//! are collected; validation does not stop at the first one.

use crate::diagnostic::ConfigError;
use crate::model::BridgeConfig;
use crate::settings::RelaySettings;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let host = config.server.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::Validation {
            message: "server.host must not be empty".to_string(),
        });
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::Validation {
                message: format!("server.host `{host}` is not a valid IP address or hostname"),
            });
        }
    }

    if !LOG_LEVELS.contains(&config.server.log_level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "server.log_level `{}` must be one of {}",
                config.server.log_level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.storage.operation_timeout_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "storage.operation_timeout_ms must be greater than 0".to_string(),
        });
    }

    for (name, key) in [
        ("auth.api_key", &config.auth.api_key),
        ("auth.admin_key", &config.auth.admin_key),
    ] {
        if let Some(key) = key
            && key.trim().is_empty()
        {
            errors.push(ConfigError::Validation {
                message: format!("{name} must not be blank when set"),
            });
        }
    }

    if let Err(problems) = RelaySettings::from_relay_config(&config.relay).check() {
        errors.extend(problems.into_iter().map(|message| ConfigError::Validation {
            message: format!("relay.{message}"),
        }));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
