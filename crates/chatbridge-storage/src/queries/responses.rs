// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Response operations.

use chatbridge_core::types::ResponseView;
use chatbridge_core::BridgeError;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, write_tx};

/// Outcome of [`insert_response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseInsert {
    Created(i64),
    UnknownSession,
    /// The referenced message is missing or belongs to another session.
    ForeignMessage(i64),
}

/// Record a response for an existing session.
///
/// When `message_id` is set it must name a message of the same session.
pub async fn insert_response(
    db: &Database,
    session_id: &str,
    text: &str,
    message_id: Option<i64>,
) -> Result<ResponseInsert, BridgeError> {
    let session_id = session_id.to_string();
    let text = text.to_string();
    db.call(move |conn| -> Result<ResponseInsert, rusqlite::Error> {
        let tx = write_tx(conn)?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM sessions WHERE session_id = ?1)",
            params![session_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(ResponseInsert::UnknownSession);
        }
        if let Some(mid) = message_id {
            let owner: Option<String> = tx
                .query_row(
                    "SELECT session_id FROM messages WHERE id = ?1",
                    params![mid],
                    |row| row.get(0),
                )
                .optional()?;
            if owner.as_deref() != Some(session_id.as_str()) {
                return Ok(ResponseInsert::ForeignMessage(mid));
            }
        }
        tx.execute(
            "INSERT INTO responses (session_id, response, message_id) VALUES (?1, ?2, ?3)",
            params![session_id, text, message_id],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(ResponseInsert::Created(id))
    })
    .await
}

/// Responses for one session in generation order.
pub async fn list_for_session(
    db: &Database,
    session_id: &str,
    since: Option<String>,
) -> Result<Vec<ResponseView>, BridgeError> {
    let session_id = session_id.to_string();
    db.call(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, response, message_id, created_at
             FROM responses
             WHERE session_id = ?1 AND (?2 IS NULL OR created_at > ?2)
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![session_id, since], |row| {
            Ok(ResponseView {
                id: row.get(0)?,
                response: row.get(1)?,
                message_id: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        rows.collect()
    })
    .await
}
