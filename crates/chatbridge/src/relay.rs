// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Opening the relay stack from a [`BridgeConfig`].
//!
//! The database is opened (and migrated) first. `[relay]` values seed any
//! `system_config` keys that are missing, then the stored table is parsed
//! once into the live [`RelaySettings`] shared by store and limiter.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use chatbridge_config::{BridgeConfig, RelaySettings, SettingsHandle};
use chatbridge_core::{BridgeError, ConfigStore, PluginAdapter, RelayStore};
use chatbridge_ratelimit::RateLimiter;
use chatbridge_storage::{Database, SqliteRelayStore};

/// The opened store, limiter and live settings.
pub struct Relay {
    pub store: Arc<SqliteRelayStore>,
    pub limiter: Arc<RateLimiter>,
    pub settings: SettingsHandle,
}

/// Rows removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions: usize,
    pub rate_limits: usize,
}

pub async fn open_relay(config: &BridgeConfig) -> Result<Relay, BridgeError> {
    let path = config.storage.database_path.as_str();
    let op_timeout = Duration::from_millis(config.storage.operation_timeout_ms);

    let db = Database::open_with(path, config.storage.wal_mode).await?;

    let defaults = RelaySettings::from_relay_config(&config.relay);
    let settings = SettingsHandle::new(defaults.clone());
    let store = Arc::new(SqliteRelayStore::new(
        db,
        Arc::new(settings.clone()),
        op_timeout,
    ));

    let seeded = store.seed_config(&defaults.to_map()).await?;
    if seeded > 0 {
        debug!(seeded, "seeded system_config defaults");
    }
    let stored = store.get_all_config().await?;
    let effective = RelaySettings::from_map(&stored, &defaults)
        .map_err(|e| BridgeError::Config(format!("invalid value in system_config: {e}")))?;
    settings.replace(effective);

    let limiter = Arc::new(RateLimiter::open(path, Arc::new(settings.clone()), op_timeout).await?);

    info!(path, "relay storage ready");
    Ok(Relay {
        store,
        limiter,
        settings,
    })
}

/// Remove inactive sessions and expired rate-limit records.
pub async fn sweep_once(
    store: &dyn RelayStore,
    limiter: &RateLimiter,
) -> Result<SweepReport, BridgeError> {
    let sessions = store.cleanup_inactive_sessions().await?;
    let rate_limits = limiter.cleanup_expired_limits().await?;
    Ok(SweepReport {
        sessions,
        rate_limits,
    })
}

impl Relay {
    /// Checkpoint and release both connections.
    pub async fn shutdown(&self) -> Result<(), BridgeError> {
        self.limiter.shutdown().await?;
        self.store.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatbridge_core::{ConfigProvider, Endpoint};
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.storage.database_path = dir.path().join("relay.db").display().to_string();
        config
    }

    #[tokio::test]
    async fn first_open_seeds_relay_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(&dir);
        config.relay.rate_limit_inbox = 7;

        let relay = open_relay(&config).await.unwrap();
        assert_eq!(relay.settings.rate_limit(Endpoint::Inbox), 7);
        assert_eq!(
            relay.store.get_config("rate_limit_inbox").await.unwrap().as_deref(),
            Some("7")
        );
        relay.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn stored_values_win_over_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        let relay = open_relay(&config).await.unwrap();
        let mut update = std::collections::BTreeMap::new();
        update.insert("session_timeout".to_string(), "900".to_string());
        relay.store.update_config(&update).await.unwrap();
        relay.shutdown().await.unwrap();

        let reopened = open_relay(&config).await.unwrap();
        assert_eq!(reopened.settings.load().session_timeout, 900);
        reopened.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn garbage_in_system_config_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        let relay = open_relay(&config).await.unwrap();
        let mut update = std::collections::BTreeMap::new();
        update.insert("max_message_length".to_string(), "lots".to_string());
        relay.store.update_config(&update).await.unwrap();
        relay.shutdown().await.unwrap();

        match open_relay(&config).await {
            Err(BridgeError::Config(msg)) => assert!(msg.contains("max_message_length")),
            other => panic!("expected Config error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn sweep_on_fresh_database_removes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let relay = open_relay(&config_in(&dir)).await.unwrap();
        let report = sweep_once(relay.store.as_ref(), &relay.limiter).await.unwrap();
        assert_eq!(report, SweepReport::default());
        relay.shutdown().await.unwrap();
    }
}
