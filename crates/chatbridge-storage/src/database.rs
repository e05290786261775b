// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! A [`Database`] wraps one `tokio_rusqlite::Connection`; every query runs as
//! a closure on that connection's background thread, so calls through one
//! handle never interleave. Other components that need the same file open
//! their own connection with [`open_connection`] and go through
//! [`call_within`].
//!
//! Deadlines are enforced on the worker thread, not by dropping the waiting
//! future: a closure that starts late does nothing, and SQLite's busy wait is
//! capped at the remaining budget. The caller always receives the closure's
//! real outcome, so [`BridgeError::Timeout`] means nothing was committed.

use std::path::Path;
use std::time::{Duration, Instant};

use chatbridge_core::BridgeError;
use rusqlite::{ErrorCode, Transaction, TransactionBehavior};
use tracing::debug;

use crate::migrations;

/// Budget for one operation when the caller does not set one.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the relay database.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
    op_timeout: Duration,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("op_timeout", &self.op_timeout)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open (creating if needed) the database at `path` in WAL mode and
    /// bring the schema up to date.
    pub async fn open(path: &str) -> Result<Self, BridgeError> {
        Self::open_with(path, true).await
    }

    /// Like [`open`](Self::open), with the journal mode chosen by the caller.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, BridgeError> {
        let owned = path.to_string();
        tokio::task::spawn_blocking(move || prepare_file(&owned, wal_mode))
            .await
            .map_err(|e| BridgeError::Internal(format!("database setup task failed: {e}")))??;

        let conn = open_connection(path).await?;
        debug!(path, wal_mode, "database opened");
        Ok(Self {
            conn,
            op_timeout: DEFAULT_OPERATION_TIMEOUT,
        })
    }

    /// Use `op_timeout` as the budget for every [`call`](Self::call).
    pub fn with_operation_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    pub fn operation_timeout(&self) -> Duration {
        self.op_timeout
    }

    /// The underlying async connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Run `f` on the connection thread within this handle's budget.
    pub async fn call<F, R>(&self, f: F) -> Result<R, BridgeError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, rusqlite::Error> + Send + 'static,
        R: Send + 'static,
    {
        call_within(&self.conn, self.op_timeout, f).await
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), BridgeError> {
        checkpoint(&self.conn, self.op_timeout).await?;
        self.conn.close().await.map_err(BridgeError::storage)?;
        debug!("database closed");
        Ok(())
    }
}

/// Create parent directories, set the journal mode and run migrations on a
/// short-lived synchronous connection.
fn prepare_file(path: &str, wal_mode: bool) -> Result<(), BridgeError> {
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(BridgeError::storage)?;
    }

    let mut conn = rusqlite::Connection::open(path).map_err(BridgeError::storage)?;
    conn.busy_timeout(DEFAULT_OPERATION_TIMEOUT)
        .map_err(BridgeError::storage)?;
    let mode = if wal_mode { "WAL" } else { "DELETE" };
    let applied: String = conn
        .pragma_update_and_check(None, "journal_mode", mode, |row| row.get(0))
        .map_err(BridgeError::storage)?;
    debug!(journal_mode = %applied, "journal mode set");

    migrations::run_migrations(&mut conn)
}

/// Open an async connection to an already-migrated database file with the
/// per-connection pragmas every component needs. The busy timeout is set per
/// call by [`call_within`].
pub async fn open_connection(path: &str) -> Result<tokio_rusqlite::Connection, BridgeError> {
    let conn = tokio_rusqlite::Connection::open(path)
        .await
        .map_err(BridgeError::storage)?;
    conn.call(|conn| -> Result<(), rusqlite::Error> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(())
    })
    .await
    .map_err(map_tr_err)?;
    Ok(conn)
}

/// Run `f` on `conn`'s thread, giving it at most `budget` from now.
///
/// If the closure is dequeued after the deadline it returns without touching
/// the database. Otherwise the busy timeout is set to the time left, and a
/// busy failure past the deadline is reported as [`BridgeError::Timeout`].
/// `f` must commit as its last step, so an error from `f` leaves its
/// transaction rolled back.
pub async fn call_within<F, R>(
    conn: &tokio_rusqlite::Connection,
    budget: Duration,
    f: F,
) -> Result<R, BridgeError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, rusqlite::Error> + Send + 'static,
    R: Send + 'static,
{
    let deadline = Instant::now().checked_add(budget);
    conn.call(move |conn| -> Result<R, rusqlite::Error> {
        if let Some(deadline) = deadline {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .filter(|left| !left.is_zero())
                .ok_or_else(deadline_exceeded)?;
            // SQLite takes whole milliseconds; round up so an exhausted
            // busy wait always lands past the deadline.
            conn.busy_timeout(remaining + Duration::from_micros(999))?;
        }
        f(conn).map_err(|e| match deadline {
            Some(deadline) if is_busy(&e) && Instant::now() >= deadline => deadline_exceeded(),
            _ => e,
        })
    })
    .await
    .map_err(|e| match e {
        tokio_rusqlite::Error::Error(ref inner) if is_deadline(inner) => {
            BridgeError::Timeout { duration: budget }
        }
        other => map_tr_err(other),
    })
}

fn deadline_exceeded() -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_INTERRUPT),
        Some("operation deadline exceeded".to_string()),
    )
}

fn is_deadline(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::OperationInterrupted
    )
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// Begin a write transaction that takes the write lock up front, so lock
/// waits happen under the busy handler instead of failing on upgrade.
pub fn write_tx(conn: &mut rusqlite::Connection) -> Result<Transaction<'_>, rusqlite::Error> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
}

/// Fold the WAL back into the main database file.
pub async fn checkpoint(
    conn: &tokio_rusqlite::Connection,
    budget: Duration,
) -> Result<(), BridgeError> {
    call_within(conn, budget, |conn| {
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
    })
    .await?;
    debug!("WAL checkpoint complete");
    Ok(())
}

/// Trivial round trip used by health checks.
pub async fn ping(conn: &tokio_rusqlite::Connection, budget: Duration) -> Result<(), BridgeError> {
    call_within(conn, budget, |conn| {
        conn.query_row("SELECT 1", [], |_| Ok(()))
    })
    .await
}

/// Convert a tokio-rusqlite error into [`BridgeError::Storage`].
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> BridgeError {
    BridgeError::Storage {
        source: Box::new(e),
    }
}

/// True when `err` is a SQLite constraint violation (unique, primary key).
pub fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}
