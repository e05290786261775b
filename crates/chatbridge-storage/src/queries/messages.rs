// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message operations: append, unprocessed retrieval, mark processed.

use chatbridge_core::types::{MessageView, Pagination};
use chatbridge_core::BridgeError;
use rusqlite::params;

use crate::database::{Database, write_tx};

/// Append a message to an existing session.
///
/// Returns `None` if the session does not exist.
pub async fn insert_message(
    db: &Database,
    session_id: &str,
    text: &str,
    kind: &str,
) -> Result<Option<i64>, BridgeError> {
    let session_id = session_id.to_string();
    let text = text.to_string();
    let kind = kind.to_string();
    db.call(move |conn| -> Result<Option<i64>, rusqlite::Error> {
        let tx = write_tx(conn)?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM sessions WHERE session_id = ?1)",
            params![session_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(None);
        }
        tx.execute(
            "INSERT INTO messages (session_id, message, kind) VALUES (?1, ?2, ?3)",
            params![session_id, text, kind],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(Some(id))
    })
    .await
}

const UNPROCESSED_PAGE: &str =
    "SELECT m.id, m.session_id, s.uid, m.message, m.kind, m.processed, m.created_at
     FROM messages m
     LEFT JOIN sessions s ON s.session_id = m.session_id
     WHERE m.processed = 0 AND (?1 IS NULL OR m.created_at > ?1)
     ORDER BY m.created_at ASC, m.id ASC
     LIMIT ?2 OFFSET ?3";

const UNPROCESSED_COUNT: &str = "SELECT COUNT(*) FROM messages
     WHERE processed = 0 AND (?1 IS NULL OR created_at > ?1)";

fn read_page(
    conn: &rusqlite::Connection,
    page: Pagination,
    since: Option<&str>,
) -> Result<Vec<MessageView>, rusqlite::Error> {
    let mut stmt = conn.prepare(UNPROCESSED_PAGE)?;
    let rows = stmt.query_map(params![since, page.limit, page.offset], |row| {
        Ok(MessageView {
            id: row.get(0)?,
            session_id: row.get(1)?,
            uid: row.get(2)?,
            message: row.get(3)?,
            kind: row.get(4)?,
            processed: row.get(5)?,
            created_at: row.get(6)?,
        })
    })?;
    rows.collect()
}

/// Unprocessed messages oldest first, joined with the owning session's uid.
///
/// `since` is an exclusive lower bound on `created_at`.
pub async fn list_unprocessed(
    db: &Database,
    page: Pagination,
    since: Option<String>,
) -> Result<Vec<MessageView>, BridgeError> {
    db.call(move |conn| read_page(conn, page, since.as_deref()))
        .await
}

/// Count, read and mark one page of unprocessed messages in a single write
/// transaction. Concurrent claims never return the same message.
///
/// The returned views carry the state they were read in (`processed` is
/// false); `total` is the matching count before the claim.
pub async fn claim_unprocessed(
    db: &Database,
    page: Pagination,
    since: Option<String>,
) -> Result<(Vec<MessageView>, i64), BridgeError> {
    db.call(move |conn| -> Result<(Vec<MessageView>, i64), rusqlite::Error> {
        let tx = write_tx(conn)?;
        let total: i64 = tx.query_row(UNPROCESSED_COUNT, params![since], |row| row.get(0))?;
        let claimed = read_page(&tx, page, since.as_deref())?;
        {
            let mut stmt = tx.prepare("UPDATE messages SET processed = 1 WHERE id = ?1")?;
            for message in &claimed {
                stmt.execute(params![message.id])?;
            }
        }
        tx.commit()?;
        Ok((claimed, total))
    })
    .await
}

/// Count of messages matching [`list_unprocessed`]'s filter.
pub async fn count_unprocessed(db: &Database, since: Option<String>) -> Result<i64, BridgeError> {
    db.call(move |conn| conn.query_row(UNPROCESSED_COUNT, params![since], |row| row.get(0)))
        .await
}

/// Flag messages processed. Already-processed and unknown ids are skipped.
/// Returns how many rows flipped.
pub async fn mark_processed(db: &Database, ids: &[i64]) -> Result<usize, BridgeError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let ids = ids.to_vec();
    db.call(move |conn| -> Result<usize, rusqlite::Error> {
        let tx = write_tx(conn)?;
        let mut changed = 0;
        {
            let mut stmt =
                tx.prepare("UPDATE messages SET processed = 1 WHERE id = ?1 AND processed = 0")?;
            for id in &ids {
                changed += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::sessions::insert_session;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        insert_session(&db, "session_a", None, None).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn insert_into_unknown_session_is_none() {
        let (db, _dir) = setup_db().await;
        let id = insert_message(&db, "session_missing", "hi", "user").await.unwrap();
        assert!(id.is_none());
        assert_eq!(count_unprocessed(&db, None).await.unwrap(), 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unprocessed_are_oldest_first_with_uid() {
        let (db, _dir) = setup_db().await;
        for text in ["one", "two", "three"] {
            insert_message(&db, "session_a", text, "user").await.unwrap();
        }
        let page = list_unprocessed(&db, Pagination::default(), None).await.unwrap();
        let texts: Vec<_> = page.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts, ["one", "two", "three"]);
        assert!(page.iter().all(|m| m.uid.is_some() && !m.processed));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn mark_processed_is_idempotent_and_ignores_unknown() {
        let (db, _dir) = setup_db().await;
        let id = insert_message(&db, "session_a", "x", "user").await.unwrap().unwrap();
        assert_eq!(mark_processed(&db, &[id, 9999]).await.unwrap(), 1);
        assert_eq!(mark_processed(&db, &[id]).await.unwrap(), 0);
        assert_eq!(mark_processed(&db, &[]).await.unwrap(), 0);
        assert_eq!(count_unprocessed(&db, None).await.unwrap(), 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn since_filter_is_exclusive() {
        let (db, _dir) = setup_db().await;
        insert_message(&db, "session_a", "first", "user").await.unwrap();
        let first = list_unprocessed(&db, Pagination::default(), None).await.unwrap();
        let cursor = first[0].created_at.clone();

        let after = list_unprocessed(&db, Pagination::default(), Some(cursor.clone()))
            .await
            .unwrap();
        assert!(after.iter().all(|m| m.created_at > cursor));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn claim_marks_only_the_returned_page() {
        let (db, _dir) = setup_db().await;
        for i in 0..5 {
            insert_message(&db, "session_a", &format!("m{i}"), "user").await.unwrap();
        }
        let page = Pagination::clamped(Some(2), None);

        let (first, total) = claim_unprocessed(&db, page, None).await.unwrap();
        assert_eq!(total, 5);
        let texts: Vec<_> = first.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts, ["m0", "m1"]);
        assert_eq!(count_unprocessed(&db, None).await.unwrap(), 3);

        let (second, total) = claim_unprocessed(&db, page, None).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(second[0].message, "m2");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_claims_from_two_connections_never_overlap() {
        let (db, dir) = setup_db().await;
        for i in 0..40 {
            insert_message(&db, "session_a", &format!("m{i}"), "user").await.unwrap();
        }
        let other = Database::open(dir.path().join("test.db").to_str().unwrap())
            .await
            .unwrap();
        let page = Pagination::clamped(Some(10), None);

        let mut seen = Vec::new();
        loop {
            let (a, b) = tokio::join!(
                claim_unprocessed(&db, page, None),
                claim_unprocessed(&other, page, None)
            );
            let (a, _) = a.unwrap();
            let (b, _) = b.unwrap();
            if a.is_empty() && b.is_empty() {
                break;
            }
            seen.extend(a.into_iter().chain(b).map(|m| m.id));
        }

        let delivered = seen.len();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), delivered, "a message was claimed twice");
        assert_eq!(delivered, 40);
        other.close().await.unwrap();
        db.close().await.unwrap();
    }
}
