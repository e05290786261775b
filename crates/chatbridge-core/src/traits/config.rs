// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration seams: typed runtime values, and the key/value table they
//! are persisted in.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BridgeError;
use crate::types::Endpoint;

/// Typed runtime settings injected into the store and the rate limiter.
///
/// Implementations hand out already-parsed values; nothing on the request
/// path re-reads or re-parses configuration strings.
pub trait ConfigProvider: Send + Sync {
    /// Sessions idle longer than this are removed by cleanup.
    fn session_timeout(&self) -> Duration;

    /// Maximum message or response length, in characters.
    fn max_message_length(&self) -> usize;

    /// Width of one rate-limit window.
    fn rate_limit_window(&self) -> Duration;

    /// Requests allowed per window for the given endpoint.
    fn rate_limit(&self, endpoint: Endpoint) -> u32;
}

/// Persistence for the flat `key -> string` configuration table.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Every stored key and value.
    async fn get_all_config(&self) -> Result<BTreeMap<String, String>, BridgeError>;

    /// One value, or `None` if the key is absent.
    async fn get_config(&self, key: &str) -> Result<Option<String>, BridgeError>;

    /// Insert or replace the given keys in a single transaction.
    async fn update_config(&self, values: &BTreeMap<String, String>) -> Result<(), BridgeError>;

    /// Insert keys that are not already present; existing values win.
    /// Returns the number of keys inserted.
    async fn seed_config(&self, defaults: &BTreeMap<String, String>)
    -> Result<usize, BridgeError>;
}
