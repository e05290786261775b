// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the `RelayStore` and `ConfigStore` traits.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use chatbridge_core::time::{format_timestamp, instant_before};
use chatbridge_core::types::{
    ClearedCounts, MessageView, Page, Pagination, ResponseView, Session, SessionView, UidLookup,
};
use chatbridge_core::{
    AdapterType, BridgeError, ConfigProvider, ConfigStore, HealthStatus, PluginAdapter,
    RelayStore, SessionId,
};

use crate::database::{self, Database};
use crate::queries;
use crate::queries::responses::ResponseInsert;
use crate::queries::sessions::InsertOutcome;

/// Sessions seen within this span count as active in admin listings.
pub const ACTIVE_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// SQLite-backed relay store.
///
/// Every call is bounded by the operation timeout, enforced on the
/// connection thread (see [`database::call_within`]). Thresholds such as the
/// inactivity timeout are read from the injected [`ConfigProvider`] at call
/// time, so swapped settings apply to the next call.
pub struct SqliteRelayStore {
    db: Database,
    settings: Arc<dyn ConfigProvider>,
}

impl SqliteRelayStore {
    pub fn new(db: Database, settings: Arc<dyn ConfigProvider>, op_timeout: Duration) -> Self {
        Self {
            db: db.with_operation_timeout(op_timeout),
            settings,
        }
    }

    /// The underlying database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Delete sessions idle since before `cutoff`. Exposed so callers and
    /// tests can sweep against an explicit instant.
    pub async fn cleanup_inactive_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, BridgeError> {
        let cutoff = format_timestamp(cutoff);
        let removed = queries::sessions::delete_inactive_before(&self.db, cutoff.clone()).await?;
        if removed > 0 {
            info!(removed, %cutoff, "removed inactive sessions");
        }
        Ok(removed)
    }

    fn active_since(active_only: bool) -> Option<String> {
        active_only.then(|| format_timestamp(instant_before(Utc::now(), ACTIVE_WINDOW)))
    }
}

fn unknown_session(session_id: &SessionId) -> BridgeError {
    BridgeError::UnknownSession {
        session_id: session_id.to_string(),
    }
}

#[async_trait]
impl PluginAdapter for SqliteRelayStore {
    fn name(&self) -> &str {
        "sqlite-relay-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, BridgeError> {
        match database::ping(self.db.connection(), self.db.operation_timeout()).await {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), BridgeError> {
        database::checkpoint(self.db.connection(), self.db.operation_timeout()).await?;
        debug!("relay store shut down");
        Ok(())
    }
}

#[async_trait]
impl RelayStore for SqliteRelayStore {
    async fn session_exists(&self, session_id: &SessionId) -> Result<bool, BridgeError> {
        queries::sessions::session_exists(&self.db, session_id.as_str()).await
    }

    async fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>, BridgeError> {
        queries::sessions::get_session(&self.db, session_id.as_str()).await
    }

    async fn create_session(
        &self,
        session_id: &SessionId,
        client_address: Option<&str>,
        client_agent: Option<&str>,
    ) -> Result<String, BridgeError> {
        let outcome = queries::sessions::insert_session(
            &self.db,
            session_id.as_str(),
            client_address,
            client_agent,
        )
        .await?;
        match outcome {
            InsertOutcome::Created(uid) => {
                debug!(%session_id, %uid, "session created");
                Ok(uid)
            }
            InsertOutcome::AlreadyExists => Err(BridgeError::DuplicateSession {
                session_id: session_id.to_string(),
            }),
        }
    }

    async fn get_or_create_uid(
        &self,
        session_id: &SessionId,
        client_address: Option<&str>,
        client_agent: Option<&str>,
    ) -> Result<UidLookup, BridgeError> {
        let lookup = queries::sessions::get_or_create_uid(
            &self.db,
            session_id.as_str(),
            client_address,
            client_agent,
        )
        .await?;
        if lookup.is_new {
            debug!(%session_id, uid = %lookup.uid, "session created on first contact");
        }
        Ok(lookup)
    }

    async fn create_message(
        &self,
        session_id: &SessionId,
        text: &str,
        kind: &str,
    ) -> Result<i64, BridgeError> {
        queries::messages::insert_message(&self.db, session_id.as_str(), text, kind)
            .await?
            .ok_or_else(|| unknown_session(session_id))
    }

    async fn get_unprocessed_messages(
        &self,
        page: Pagination,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MessageView>, BridgeError> {
        queries::messages::list_unprocessed(&self.db, page, since.map(format_timestamp)).await
    }

    async fn get_unprocessed_message_count(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<i64, BridgeError> {
        queries::messages::count_unprocessed(&self.db, since.map(format_timestamp)).await
    }

    async fn mark_messages_processed(&self, message_ids: &[i64]) -> Result<usize, BridgeError> {
        queries::messages::mark_processed(&self.db, message_ids).await
    }

    async fn claim_unprocessed_messages(
        &self,
        page: Pagination,
        since: Option<DateTime<Utc>>,
    ) -> Result<Page<MessageView>, BridgeError> {
        let (claimed, total) =
            queries::messages::claim_unprocessed(&self.db, page, since.map(format_timestamp))
                .await?;
        if !claimed.is_empty() {
            debug!(claimed = claimed.len(), total, "delivered unprocessed messages");
        }
        Ok(Page::new(claimed, total, page))
    }

    async fn create_response(
        &self,
        session_id: &SessionId,
        text: &str,
        message_id: Option<i64>,
    ) -> Result<i64, BridgeError> {
        let outcome =
            queries::responses::insert_response(&self.db, session_id.as_str(), text, message_id)
                .await?;
        match outcome {
            ResponseInsert::Created(id) => Ok(id),
            ResponseInsert::UnknownSession => Err(unknown_session(session_id)),
            ResponseInsert::ForeignMessage(mid) => Err(BridgeError::invalid(format!(
                "message {mid} does not belong to session {session_id}"
            ))),
        }
    }

    async fn get_session_responses(
        &self,
        session_id: &SessionId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ResponseView>, BridgeError> {
        queries::responses::list_for_session(
            &self.db,
            session_id.as_str(),
            since.map(format_timestamp),
        )
        .await
    }

    async fn get_active_sessions(
        &self,
        page: Pagination,
        active_only: bool,
    ) -> Result<Vec<SessionView>, BridgeError> {
        queries::sessions::list_sessions(&self.db, page, Self::active_since(active_only)).await
    }

    async fn get_session_count(&self, active_only: bool) -> Result<i64, BridgeError> {
        queries::sessions::count_sessions(&self.db, Self::active_since(active_only)).await
    }

    async fn update_session_activity(&self, session_id: &SessionId) -> Result<(), BridgeError> {
        if queries::sessions::touch_session(&self.db, session_id.as_str()).await? {
            Ok(())
        } else {
            Err(unknown_session(session_id))
        }
    }

    async fn cleanup_inactive_sessions(&self) -> Result<usize, BridgeError> {
        let cutoff = instant_before(Utc::now(), self.settings.session_timeout());
        self.cleanup_inactive_before(cutoff).await
    }

    async fn clear_all(&self) -> Result<ClearedCounts, BridgeError> {
        let counts = queries::admin::clear_all(&self.db).await?;
        info!(?counts, "cleared all relay data");
        Ok(counts)
    }
}

#[async_trait]
impl ConfigStore for SqliteRelayStore {
    async fn get_all_config(&self) -> Result<BTreeMap<String, String>, BridgeError> {
        queries::config::get_all(&self.db).await
    }

    async fn get_config(&self, key: &str) -> Result<Option<String>, BridgeError> {
        queries::config::get(&self.db, key).await
    }

    async fn update_config(&self, values: &BTreeMap<String, String>) -> Result<(), BridgeError> {
        queries::config::upsert_many(&self.db, values).await
    }

    async fn seed_config(
        &self,
        defaults: &BTreeMap<String, String>,
    ) -> Result<usize, BridgeError> {
        queries::config::seed(&self.db, defaults).await
    }
}
