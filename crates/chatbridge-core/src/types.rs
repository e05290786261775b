// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the store, the rate limiter and the gateway.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Hard cap on a single page of unprocessed messages or sessions.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Message kind recorded for text submitted by a chat client.
pub const USER_MESSAGE_KIND: &str = "user";

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of component behind a [`PluginAdapter`](crate::PluginAdapter).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Store,
    RateLimiter,
    Gateway,
}

/// Logical endpoint names used as the second half of a rate-limit key.
///
/// These are names, not URL paths; several routes may share one.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// Client message submission.
    Messages,
    /// Consumer polling of unprocessed messages.
    Inbox,
    /// Consumer response submission.
    Outbox,
    /// Client polling of responses.
    Responses,
    /// Admin session listing.
    Sessions,
}

impl Endpoint {
    /// Key under which this endpoint's hourly limit lives in `system_config`.
    pub fn config_key(self) -> &'static str {
        match self {
            Self::Messages => "rate_limit_messages",
            Self::Inbox => "rate_limit_inbox",
            Self::Outbox => "rate_limit_outbox",
            Self::Responses => "rate_limit_responses",
            Self::Sessions => "rate_limit_sessions",
        }
    }

    /// Requests per window when nothing overrides it.
    pub fn default_limit(self) -> u32 {
        match self {
            Self::Messages => 50,
            Self::Inbox => 120,
            Self::Outbox => 200,
            Self::Responses => 200,
            Self::Sessions => 20,
        }
    }
}

/// A chat session as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Caller-supplied identifier (`session_...`).
    pub session_id: String,
    /// Internally generated public identifier; never changes once assigned.
    pub uid: String,
    pub client_address: Option<String>,
    pub client_agent: Option<String>,
    pub created_at: String,
    pub last_activity: String,
    /// Free-form JSON object, `{}` by default.
    pub metadata: String,
}

/// Result of [`RelayStore::get_or_create_uid`](crate::RelayStore::get_or_create_uid).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UidLookup {
    pub uid: String,
    /// True only for the call that actually created the session.
    pub is_new: bool,
}

/// An unprocessed message as seen by the consumer, joined with its session uid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageView {
    pub id: i64,
    pub session_id: String,
    pub uid: Option<String>,
    pub message: String,
    pub kind: String,
    pub processed: bool,
    pub created_at: String,
}

/// A consumer response as seen by the polling client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseView {
    pub id: i64,
    pub response: String,
    pub message_id: Option<i64>,
    pub created_at: String,
}

/// A session row for admin listings, with message and response counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub uid: String,
    pub client_address: Option<String>,
    pub client_agent: Option<String>,
    pub created_at: String,
    pub last_activity: String,
    pub metadata: String,
    pub message_count: i64,
    pub response_count: i64,
}

/// Caller-side pagination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Pagination {
    /// Build a pagination request, clamping `limit` to [`MAX_PAGE_LIMIT`].
    ///
    /// A zero limit is treated as "use the default".
    pub fn clamped(limit: Option<u32>, offset: Option<u32>) -> Self {
        let limit = match limit {
            None | Some(0) => DEFAULT_PAGE_LIMIT,
            Some(l) => l.min(MAX_PAGE_LIMIT),
        };
        Self {
            limit,
            offset: offset.unwrap_or(0),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::clamped(None, None)
    }
}

/// One page of results plus the metadata a poller needs to continue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Assemble a page; `has_more` is `offset + limit < total`.
    pub fn new(items: Vec<T>, total: i64, page: Pagination) -> Self {
        let has_more = i64::from(page.offset) + i64::from(page.limit) < total;
        Self {
            items,
            total,
            limit: page.limit,
            offset: page.offset,
            has_more,
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
pub enum RateDecision {
    Permitted,
    Exceeded,
}

impl RateDecision {
    pub fn is_permitted(self) -> bool {
        matches!(self, Self::Permitted)
    }
}

/// Introspection view of one (address, endpoint) window.
///
/// A key with no live record reports `count = 0` rather than nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    pub count: u32,
    pub window_start: String,
    pub window_end: String,
}

/// A stored rate-limit counter row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitRecord {
    pub client_address: String,
    pub endpoint: String,
    pub request_count: u32,
    pub window_start: String,
}

/// Row counts removed by an admin bulk clear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearedCounts {
    pub sessions: usize,
    pub messages: usize,
    pub responses: usize,
    pub rate_limits: usize,
}
