// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime relay settings.
//!
//! The `system_config` table stores every value as a string. The strings are
//! parsed and validated exactly once, into a [`RelaySettings`], and published
//! through a [`SettingsHandle`] that the store and rate limiter read from.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chatbridge_core::{BridgeError, ConfigProvider, Endpoint};
use serde::Serialize;

use crate::model::RelayConfig;

pub const SESSION_TIMEOUT_KEY: &str = "session_timeout";
pub const MAX_MESSAGE_LENGTH_KEY: &str = "max_message_length";
pub const RATE_LIMIT_WINDOW_KEY: &str = "rate_limit_window";

/// Parsed runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelaySettings {
    /// Seconds of inactivity before a session is swept.
    pub session_timeout: u64,
    /// Characters.
    pub max_message_length: usize,
    /// Seconds.
    pub rate_limit_window: u64,
    pub rate_limit_messages: u32,
    pub rate_limit_inbox: u32,
    pub rate_limit_outbox: u32,
    pub rate_limit_responses: u32,
    pub rate_limit_sessions: u32,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self::from_relay_config(&RelayConfig::default())
    }
}

impl RelaySettings {
    /// Every key this type understands.
    pub fn known_keys() -> Vec<&'static str> {
        let mut keys = vec![
            SESSION_TIMEOUT_KEY,
            MAX_MESSAGE_LENGTH_KEY,
            RATE_LIMIT_WINDOW_KEY,
        ];
        keys.extend(
            [
                Endpoint::Messages,
                Endpoint::Inbox,
                Endpoint::Outbox,
                Endpoint::Responses,
                Endpoint::Sessions,
            ]
            .map(Endpoint::config_key),
        );
        keys
    }

    pub fn from_relay_config(relay: &RelayConfig) -> Self {
        Self {
            session_timeout: relay.session_timeout,
            max_message_length: relay.max_message_length,
            rate_limit_window: relay.rate_limit_window,
            rate_limit_messages: relay.rate_limit_messages,
            rate_limit_inbox: relay.rate_limit_inbox,
            rate_limit_outbox: relay.rate_limit_outbox,
            rate_limit_responses: relay.rate_limit_responses,
            rate_limit_sessions: relay.rate_limit_sessions,
        }
    }

    /// Semantic checks. Every value must be positive.
    ///
    /// Returns one `key must ...` message per problem.
    pub fn check(&self) -> Result<(), Vec<String>> {
        let values: [(&str, u64); 8] = [
            (SESSION_TIMEOUT_KEY, self.session_timeout),
            (MAX_MESSAGE_LENGTH_KEY, self.max_message_length as u64),
            (RATE_LIMIT_WINDOW_KEY, self.rate_limit_window),
            (
                Endpoint::Messages.config_key(),
                self.rate_limit_messages.into(),
            ),
            (Endpoint::Inbox.config_key(), self.rate_limit_inbox.into()),
            (Endpoint::Outbox.config_key(), self.rate_limit_outbox.into()),
            (
                Endpoint::Responses.config_key(),
                self.rate_limit_responses.into(),
            ),
            (
                Endpoint::Sessions.config_key(),
                self.rate_limit_sessions.into(),
            ),
        ];
        let problems: Vec<String> = values
            .iter()
            .filter(|(_, v)| *v == 0)
            .map(|(k, _)| format!("{k} must be greater than 0"))
            .collect();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }

    /// Render as the string table stored in `system_config`.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(
            SESSION_TIMEOUT_KEY.to_string(),
            self.session_timeout.to_string(),
        );
        map.insert(
            MAX_MESSAGE_LENGTH_KEY.to_string(),
            self.max_message_length.to_string(),
        );
        map.insert(
            RATE_LIMIT_WINDOW_KEY.to_string(),
            self.rate_limit_window.to_string(),
        );
        for endpoint in [
            Endpoint::Messages,
            Endpoint::Inbox,
            Endpoint::Outbox,
            Endpoint::Responses,
            Endpoint::Sessions,
        ] {
            map.insert(
                endpoint.config_key().to_string(),
                self.rate_limit(endpoint).to_string(),
            );
        }
        map
    }

    /// Build settings from a string table, taking anything missing from
    /// `base`. Unknown keys are ignored.
    ///
    /// The result is validated as a whole; any unparsable or non-positive
    /// value fails with [`BridgeError::InvalidInput`] naming every bad key.
    pub fn from_map(map: &BTreeMap<String, String>, base: &Self) -> Result<Self, BridgeError> {
        let mut problems = Vec::new();
        let mut next = base.clone();

        parse_into(map, SESSION_TIMEOUT_KEY, &mut next.session_timeout, &mut problems);
        parse_into(
            map,
            MAX_MESSAGE_LENGTH_KEY,
            &mut next.max_message_length,
            &mut problems,
        );
        parse_into(
            map,
            RATE_LIMIT_WINDOW_KEY,
            &mut next.rate_limit_window,
            &mut problems,
        );
        parse_into(
            map,
            Endpoint::Messages.config_key(),
            &mut next.rate_limit_messages,
            &mut problems,
        );
        parse_into(
            map,
            Endpoint::Inbox.config_key(),
            &mut next.rate_limit_inbox,
            &mut problems,
        );
        parse_into(
            map,
            Endpoint::Outbox.config_key(),
            &mut next.rate_limit_outbox,
            &mut problems,
        );
        parse_into(
            map,
            Endpoint::Responses.config_key(),
            &mut next.rate_limit_responses,
            &mut problems,
        );
        parse_into(
            map,
            Endpoint::Sessions.config_key(),
            &mut next.rate_limit_sessions,
            &mut problems,
        );

        if problems.is_empty()
            && let Err(semantic) = next.check()
        {
            problems = semantic;
        }
        if problems.is_empty() {
            Ok(next)
        } else {
            Err(BridgeError::invalid(problems.join("; ")))
        }
    }
}

fn parse_into<T: std::str::FromStr>(
    map: &BTreeMap<String, String>,
    key: &str,
    slot: &mut T,
    problems: &mut Vec<String>,
) {
    if let Some(raw) = map.get(key) {
        match raw.trim().parse::<T>() {
            Ok(v) => *slot = v,
            Err(_) => problems.push(format!(
                "{key} must be a non-negative integer, got `{raw}`"
            )),
        }
    }
}

impl ConfigProvider for RelaySettings {
    fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout)
    }

    fn max_message_length(&self) -> usize {
        self.max_message_length
    }

    fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window)
    }

    fn rate_limit(&self, endpoint: Endpoint) -> u32 {
        match endpoint {
            Endpoint::Messages => self.rate_limit_messages,
            Endpoint::Inbox => self.rate_limit_inbox,
            Endpoint::Outbox => self.rate_limit_outbox,
            Endpoint::Responses => self.rate_limit_responses,
            Endpoint::Sessions => self.rate_limit_sessions,
        }
    }
}

/// Shared, hot-swappable view of the current [`RelaySettings`].
///
/// Cloning is cheap; every clone observes the same published value.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    current: Arc<ArcSwap<RelaySettings>>,
}

impl SettingsHandle {
    pub fn new(settings: RelaySettings) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(settings)),
        }
    }

    /// Snapshot of the current settings.
    pub fn load(&self) -> Arc<RelaySettings> {
        self.current.load_full()
    }

    /// Publish new settings to every holder of this handle.
    pub fn replace(&self, settings: RelaySettings) {
        tracing::info!(?settings, "relay settings updated");
        self.current.store(Arc::new(settings));
    }
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self::new(RelaySettings::default())
    }
}

impl ConfigProvider for SettingsHandle {
    fn session_timeout(&self) -> Duration {
        self.current.load().session_timeout()
    }

    fn max_message_length(&self) -> usize {
        self.current.load().max_message_length
    }

    fn rate_limit_window(&self) -> Duration {
        self.current.load().rate_limit_window()
    }

    fn rate_limit(&self, endpoint: Endpoint) -> u32 {
        self.current.load().rate_limit(endpoint)
    }
}
