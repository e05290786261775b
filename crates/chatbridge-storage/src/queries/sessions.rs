// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session operations.

use chatbridge_core::types::{Pagination, Session, SessionView, UidLookup};
use chatbridge_core::BridgeError;
use rand::RngCore;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, is_constraint_violation, write_tx};

/// Generate a 16-hex-character public session uid from the thread-local
/// CSPRNG.
pub fn generate_uid() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Outcome of a direct insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Created(String),
    AlreadyExists,
}

/// Whether a session exists.
pub async fn session_exists(db: &Database, session_id: &str) -> Result<bool, BridgeError> {
    let session_id = session_id.to_string();
    db.call(move |conn| {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sessions WHERE session_id = ?1)",
            params![session_id],
            |row| row.get::<_, bool>(0),
        )
    })
    .await
}

/// Fetch a session by id.
pub async fn get_session(db: &Database, session_id: &str) -> Result<Option<Session>, BridgeError> {
    let session_id = session_id.to_string();
    db.call(move |conn| {
        conn.query_row(
            "SELECT session_id, uid, client_address, client_agent, created_at,
                    last_activity, metadata
             FROM sessions WHERE session_id = ?1",
            params![session_id],
            |row| {
                Ok(Session {
                    session_id: row.get(0)?,
                    uid: row.get(1)?,
                    client_address: row.get(2)?,
                    client_agent: row.get(3)?,
                    created_at: row.get(4)?,
                    last_activity: row.get(5)?,
                    metadata: row.get(6)?,
                })
            },
        )
        .optional()
    })
    .await
}

/// Insert a new session with a fresh uid. Never overwrites an existing row.
pub async fn insert_session(
    db: &Database,
    session_id: &str,
    client_address: Option<&str>,
    client_agent: Option<&str>,
) -> Result<InsertOutcome, BridgeError> {
    let session_id = session_id.to_string();
    let client_address = client_address.map(str::to_string);
    let client_agent = client_agent.map(str::to_string);
    let uid = generate_uid();
    db.call(move |conn| -> Result<InsertOutcome, rusqlite::Error> {
        let inserted = conn.execute(
            "INSERT INTO sessions (session_id, uid, client_address, client_agent)
             VALUES (?1, ?2, ?3, ?4)",
            params![session_id, uid, client_address, client_agent],
        );
        match inserted {
            Ok(_) => Ok(InsertOutcome::Created(uid)),
            Err(e) if is_constraint_violation(&e) => Ok(InsertOutcome::AlreadyExists),
            Err(e) => Err(e),
        }
    })
    .await
}

/// Return the session's uid, creating the session first if it is absent.
///
/// `INSERT OR IGNORE` followed by a read in one transaction: concurrent
/// first contacts for the same id agree on one uid and only the inserting
/// call reports `is_new`.
pub async fn get_or_create_uid(
    db: &Database,
    session_id: &str,
    client_address: Option<&str>,
    client_agent: Option<&str>,
) -> Result<UidLookup, BridgeError> {
    let session_id = session_id.to_string();
    let client_address = client_address.map(str::to_string);
    let client_agent = client_agent.map(str::to_string);
    let candidate = generate_uid();
    db.call(move |conn| -> Result<UidLookup, rusqlite::Error> {
        let tx = write_tx(conn)?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO sessions (session_id, uid, client_address, client_agent)
             VALUES (?1, ?2, ?3, ?4)",
            params![session_id, candidate, client_address, client_agent],
        )?;
        let uid: String = tx.query_row(
            "SELECT uid FROM sessions WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(UidLookup {
            uid,
            is_new: inserted == 1,
        })
    })
    .await
}

/// Set `last_activity` to now. Returns whether the session exists.
pub async fn touch_session(db: &Database, session_id: &str) -> Result<bool, BridgeError> {
    let session_id = session_id.to_string();
    db.call(move |conn| {
        let changed = conn.execute(
            "UPDATE sessions SET last_activity = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(changed == 1)
    })
    .await
}

/// Sessions newest-activity first, with message and response counts.
///
/// When `active_since` is set only sessions with `last_activity >= active_since`
/// are listed.
pub async fn list_sessions(
    db: &Database,
    page: Pagination,
    active_since: Option<String>,
) -> Result<Vec<SessionView>, BridgeError> {
    db.call(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT s.session_id, s.uid, s.client_address, s.client_agent, s.created_at,
                    s.last_activity, s.metadata,
                    (SELECT COUNT(*) FROM messages m WHERE m.session_id = s.session_id),
                    (SELECT COUNT(*) FROM responses r WHERE r.session_id = s.session_id)
             FROM sessions s
             WHERE ?1 IS NULL OR s.last_activity >= ?1
             ORDER BY s.last_activity DESC, s.session_id ASC
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(
            params![active_since, page.limit, page.offset],
            |row| {
                Ok(SessionView {
                    session_id: row.get(0)?,
                    uid: row.get(1)?,
                    client_address: row.get(2)?,
                    client_agent: row.get(3)?,
                    created_at: row.get(4)?,
                    last_activity: row.get(5)?,
                    metadata: row.get(6)?,
                    message_count: row.get(7)?,
                    response_count: row.get(8)?,
                })
            },
        )?;
        rows.collect()
    })
    .await
}

/// Count sessions under the same filter as [`list_sessions`].
pub async fn count_sessions(db: &Database, active_since: Option<String>) -> Result<i64, BridgeError> {
    db.call(move |conn| {
        conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE ?1 IS NULL OR last_activity >= ?1",
            params![active_since],
            |row| row.get(0),
        )
    })
    .await
}

/// Delete sessions idle since before `cutoff`, together with their messages
/// and responses, in one transaction. Returns the number of sessions removed.
pub async fn delete_inactive_before(db: &Database, cutoff: String) -> Result<usize, BridgeError> {
    db.call(move |conn| -> Result<usize, rusqlite::Error> {
        let tx = write_tx(conn)?;
        tx.execute(
            "DELETE FROM responses WHERE session_id IN
                (SELECT session_id FROM sessions WHERE last_activity < ?1)",
            params![cutoff],
        )?;
        tx.execute(
            "DELETE FROM messages WHERE session_id IN
                (SELECT session_id FROM sessions WHERE last_activity < ?1)",
            params![cutoff],
        )?;
        let removed = tx.execute(
            "DELETE FROM sessions WHERE last_activity < ?1",
            params![cutoff],
        )?;
        tx.commit()?;
        Ok(removed)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[test]
    fn uids_are_sixteen_hex_chars_and_distinct() {
        let a = generate_uid();
        let b = generate_uid();
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn insert_and_get_session_roundtrips() {
        let (db, _dir) = setup_db().await;
        let outcome = insert_session(&db, "session_a", Some("10.0.0.1"), Some("curl/8"))
            .await
            .unwrap();
        let InsertOutcome::Created(uid) = outcome else {
            panic!("expected a new session");
        };

        let session = get_session(&db, "session_a").await.unwrap().unwrap();
        assert_eq!(session.uid, uid);
        assert_eq!(session.client_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(session.client_agent.as_deref(), Some("curl/8"));
        assert_eq!(session.metadata, "{}");
        assert!(session_exists(&db, "session_a").await.unwrap());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn insert_twice_reports_existing_and_keeps_uid() {
        let (db, _dir) = setup_db().await;
        insert_session(&db, "session_a", None, None).await.unwrap();
        let before = get_session(&db, "session_a").await.unwrap().unwrap().uid;
        let again = insert_session(&db, "session_a", None, None).await.unwrap();
        assert_eq!(again, InsertOutcome::AlreadyExists);
        let after = get_session(&db, "session_a").await.unwrap().unwrap().uid;
        assert_eq!(before, after);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_missing_session_returns_none() {
        let (db, _dir) = setup_db().await;
        assert!(get_session(&db, "session_none").await.unwrap().is_none());
        assert!(!session_exists(&db, "session_none").await.unwrap());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn touch_unknown_session_is_false() {
        let (db, _dir) = setup_db().await;
        assert!(!touch_session(&db, "session_none").await.unwrap());
        db.close().await.unwrap();
    }
}
