// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session/message/response store trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BridgeError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    ClearedCounts, MessageView, Page, Pagination, ResponseView, Session, SessionView, UidLookup,
};
use crate::validate::SessionId;

/// Durable bookkeeping for the relay.
///
/// Every mutating operation runs in exactly one transaction; on failure the
/// transaction is rolled back and [`BridgeError::Storage`] (or
/// [`BridgeError::Timeout`]) is returned. The store never consults the rate
/// limiter.
#[async_trait]
pub trait RelayStore: PluginAdapter {
    /// Whether a session with this id exists.
    async fn session_exists(&self, session_id: &SessionId) -> Result<bool, BridgeError>;

    /// Fetch a session row.
    async fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>, BridgeError>;

    /// Create a session with a fresh random uid and return the uid.
    ///
    /// Fails with [`BridgeError::DuplicateSession`] if the id is taken.
    async fn create_session(
        &self,
        session_id: &SessionId,
        client_address: Option<&str>,
        client_agent: Option<&str>,
    ) -> Result<String, BridgeError>;

    /// Return the existing uid, or create the session and return its new uid.
    ///
    /// Atomic with respect to concurrent first contact: exactly one caller
    /// observes `is_new = true`.
    async fn get_or_create_uid(
        &self,
        session_id: &SessionId,
        client_address: Option<&str>,
        client_agent: Option<&str>,
    ) -> Result<UidLookup, BridgeError>;

    /// Append a message. Fails with [`BridgeError::UnknownSession`] if the
    /// session does not exist.
    async fn create_message(
        &self,
        session_id: &SessionId,
        text: &str,
        kind: &str,
    ) -> Result<i64, BridgeError>;

    /// Unprocessed messages, oldest first, optionally only those created
    /// strictly after `since`. The caller clamps the page size.
    async fn get_unprocessed_messages(
        &self,
        page: Pagination,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MessageView>, BridgeError>;

    /// Count of messages matching the same filter as
    /// [`get_unprocessed_messages`](Self::get_unprocessed_messages).
    async fn get_unprocessed_message_count(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<i64, BridgeError>;

    /// Flag messages as processed. Idempotent; unknown ids are ignored.
    /// Returns the number of rows that changed state.
    async fn mark_messages_processed(&self, message_ids: &[i64]) -> Result<usize, BridgeError>;

    /// Read one page of unprocessed messages and mark exactly those
    /// processed, in one transaction. This is the consumer's delivery path:
    /// concurrent callers never receive the same message. `total` is the
    /// matching count before the claim.
    async fn claim_unprocessed_messages(
        &self,
        page: Pagination,
        since: Option<DateTime<Utc>>,
    ) -> Result<Page<MessageView>, BridgeError>;

    /// Record a consumer response. Fails with [`BridgeError::UnknownSession`]
    /// if the session does not exist and with [`BridgeError::InvalidInput`]
    /// if `message_id` names a message of another session.
    async fn create_response(
        &self,
        session_id: &SessionId,
        text: &str,
        message_id: Option<i64>,
    ) -> Result<i64, BridgeError>;

    /// Responses for one session in generation order.
    async fn get_session_responses(
        &self,
        session_id: &SessionId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ResponseView>, BridgeError>;

    /// Sessions ordered by last activity, newest first. `active_only`
    /// restricts to sessions seen in the last 24 hours.
    async fn get_active_sessions(
        &self,
        page: Pagination,
        active_only: bool,
    ) -> Result<Vec<SessionView>, BridgeError>;

    /// Count of sessions under the same filter as
    /// [`get_active_sessions`](Self::get_active_sessions).
    async fn get_session_count(&self, active_only: bool) -> Result<i64, BridgeError>;

    /// Bump a session's last activity to now.
    async fn update_session_activity(&self, session_id: &SessionId) -> Result<(), BridgeError>;

    /// Delete sessions idle past the configured threshold, together with
    /// their messages and responses. Returns the number of sessions removed.
    async fn cleanup_inactive_sessions(&self) -> Result<usize, BridgeError>;

    /// Delete every session, message, response and rate-limit record.
    async fn clear_all(&self) -> Result<ClearedCounts, BridgeError>;
}
