// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-window rate limiter backed by SQLite.
//!
//! Each (address, endpoint) key has at most one row. A row whose
//! `window_start` is older than one window is expired: it is swept eagerly
//! on every check, or explicitly through [`RateLimiter::cleanup_expired_limits`].
//!
//! Failure policy: the eager sweep fails open (logged and skipped); the
//! lookup/increment step fails closed (the error is returned and the caller
//! must not treat the request as permitted).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use tracing::{debug, info, warn};

use chatbridge_core::time::{format_timestamp, instant_after, instant_before};
use chatbridge_core::types::{RateDecision, RateLimitInfo, RateLimitRecord};
use chatbridge_core::{
    AdapterType, BridgeError, ConfigProvider, Endpoint, HealthStatus, PluginAdapter,
};
use chatbridge_storage::database;

/// Persistent rate limiter.
///
/// Opens its own connection to the relay database so its transactions are
/// independent of the store's: a failed check never rolls back a committed
/// store write and vice versa.
pub struct RateLimiter {
    conn: tokio_rusqlite::Connection,
    settings: Arc<dyn ConfigProvider>,
    op_timeout: Duration,
}

impl RateLimiter {
    /// Wrap an existing connection. The `rate_limits` table must exist.
    pub fn new(
        conn: tokio_rusqlite::Connection,
        settings: Arc<dyn ConfigProvider>,
        op_timeout: Duration,
    ) -> Self {
        Self {
            conn,
            settings,
            op_timeout,
        }
    }

    /// Open a limiter on the database file at `path`.
    ///
    /// The schema must already be in place (created by the storage
    /// migrations when the store's database was opened).
    pub async fn open(
        path: &str,
        settings: Arc<dyn ConfigProvider>,
        op_timeout: Duration,
    ) -> Result<Self, BridgeError> {
        let conn = database::open_connection(path).await?;
        Ok(Self::new(conn, settings, op_timeout))
    }

    fn window(&self) -> Duration {
        self.settings.rate_limit_window()
    }

    /// Check and count one request against the configured limit for `endpoint`.
    pub async fn check_endpoint(
        &self,
        address: &str,
        endpoint: Endpoint,
    ) -> Result<RateDecision, BridgeError> {
        let limit = self.settings.rate_limit(endpoint);
        self.check(address, &endpoint.to_string(), limit).await
    }

    /// Check and count one request for `(address, endpoint)` against `limit`.
    pub async fn check(
        &self,
        address: &str,
        endpoint: &str,
        limit: u32,
    ) -> Result<RateDecision, BridgeError> {
        self.check_at(address, endpoint, limit, Utc::now()).await
    }

    /// [`check`](Self::check) evaluated at an explicit instant.
    ///
    /// A denied request is not counted.
    pub async fn check_at(
        &self,
        address: &str,
        endpoint: &str,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, BridgeError> {
        let cutoff = format_timestamp(instant_before(now, self.window()));

        if let Err(e) = self.sweep(cutoff.clone()).await {
            warn!(error = %e, "rate limit sweep failed; continuing");
        }

        if limit == 0 {
            return Ok(RateDecision::Exceeded);
        }

        let address_owned = address.to_string();
        let endpoint_owned = endpoint.to_string();
        let now_ts = format_timestamp(now);
        let decision = database::call_within(
            &self.conn,
            self.op_timeout,
            move |conn| -> Result<RateDecision, rusqlite::Error> {
                let tx = database::write_tx(conn)?;
                let live: Option<u32> = tx
                    .query_row(
                        "SELECT request_count FROM rate_limits
                         WHERE client_address = ?1 AND endpoint = ?2 AND window_start >= ?3",
                        params![address_owned, endpoint_owned, cutoff],
                        |row| row.get(0),
                    )
                    .optional()?;
                let decision = match live {
                    None => {
                        tx.execute(
                            "INSERT INTO rate_limits
                                (client_address, endpoint, request_count, window_start)
                             VALUES (?1, ?2, 1, ?3)
                             ON CONFLICT(client_address, endpoint) DO UPDATE SET
                                request_count = 1,
                                window_start = excluded.window_start",
                            params![address_owned, endpoint_owned, now_ts],
                        )?;
                        RateDecision::Permitted
                    }
                    Some(count) if count < limit => {
                        tx.execute(
                            "UPDATE rate_limits SET request_count = request_count + 1
                             WHERE client_address = ?1 AND endpoint = ?2",
                            params![address_owned, endpoint_owned],
                        )?;
                        RateDecision::Permitted
                    }
                    Some(_) => RateDecision::Exceeded,
                };
                tx.commit()?;
                Ok(decision)
            },
        )
        .await?;

        if !decision.is_permitted() {
            debug!(address, endpoint, limit, "rate limit exceeded");
        }
        Ok(decision)
    }

    async fn sweep(&self, cutoff: String) -> Result<usize, BridgeError> {
        database::call_within(&self.conn, self.op_timeout, move |conn| {
            conn.execute(
                "DELETE FROM rate_limits WHERE window_start < ?1",
                params![cutoff],
            )
        })
        .await
    }

    /// Current window for a key. A key with no live record reports a zero
    /// count and a window starting now.
    pub async fn get_rate_limit_info(
        &self,
        address: &str,
        endpoint: &str,
    ) -> Result<RateLimitInfo, BridgeError> {
        self.get_rate_limit_info_at(address, endpoint, Utc::now()).await
    }

    /// [`get_rate_limit_info`](Self::get_rate_limit_info) at an explicit instant.
    pub async fn get_rate_limit_info_at(
        &self,
        address: &str,
        endpoint: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitInfo, BridgeError> {
        let window = self.window();
        let cutoff = format_timestamp(instant_before(now, window));
        let address = address.to_string();
        let endpoint = endpoint.to_string();
        let live = database::call_within(&self.conn, self.op_timeout, move |conn| {
            conn.query_row(
                "SELECT request_count, window_start FROM rate_limits
                 WHERE client_address = ?1 AND endpoint = ?2 AND window_start >= ?3",
                params![address, endpoint, cutoff],
                |row| Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
        })
        .await?;

        match live {
            Some((count, window_start)) => {
                let start = DateTime::parse_from_rfc3339(&window_start)
                    .map_err(|e| {
                        BridgeError::Internal(format!(
                            "stored window start `{window_start}` is unreadable: {e}"
                        ))
                    })?
                    .with_timezone(&Utc);
                Ok(RateLimitInfo {
                    count,
                    window_start,
                    window_end: format_timestamp(instant_after(start, window)),
                })
            }
            None => Ok(RateLimitInfo {
                count: 0,
                window_start: format_timestamp(now),
                window_end: format_timestamp(instant_after(now, window)),
            }),
        }
    }

    /// Drop the record for a key unconditionally. Returns whether one existed.
    pub async fn reset_rate_limit(&self, address: &str, endpoint: &str) -> Result<bool, BridgeError> {
        let address = address.to_string();
        let endpoint = endpoint.to_string();
        let removed = database::call_within(&self.conn, self.op_timeout, move |conn| {
            conn.execute(
                "DELETE FROM rate_limits WHERE client_address = ?1 AND endpoint = ?2",
                params![address, endpoint],
            )
        })
        .await?;
        Ok(removed > 0)
    }

    /// Delete every expired record. Returns how many were removed.
    pub async fn cleanup_expired_limits(&self) -> Result<usize, BridgeError> {
        self.cleanup_expired_limits_at(Utc::now()).await
    }

    /// [`cleanup_expired_limits`](Self::cleanup_expired_limits) at an explicit instant.
    pub async fn cleanup_expired_limits_at(&self, now: DateTime<Utc>) -> Result<usize, BridgeError> {
        let cutoff = format_timestamp(instant_before(now, self.window()));
        let removed = self.sweep(cutoff).await?;
        if removed > 0 {
            info!(removed, "removed expired rate limit records");
        }
        Ok(removed)
    }

    /// Every stored record, newest window first.
    pub async fn get_all_rate_limits(&self) -> Result<Vec<RateLimitRecord>, BridgeError> {
        database::call_within(&self.conn, self.op_timeout, |conn| {
            let mut stmt = conn.prepare(
                "SELECT client_address, endpoint, request_count, window_start
                 FROM rate_limits
                 ORDER BY window_start DESC, client_address ASC, endpoint ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(RateLimitRecord {
                    client_address: row.get(0)?,
                    endpoint: row.get(1)?,
                    request_count: row.get(2)?,
                    window_start: row.get(3)?,
                })
            })?;
            rows.collect()
        })
        .await
    }
}

#[async_trait]
impl PluginAdapter for RateLimiter {
    fn name(&self) -> &str {
        "sqlite-rate-limiter"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::RateLimiter
    }

    async fn health_check(&self) -> Result<HealthStatus, BridgeError> {
        match database::ping(&self.conn, self.op_timeout).await {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), BridgeError> {
        debug!("rate limiter shut down");
        Ok(())
    }
}
