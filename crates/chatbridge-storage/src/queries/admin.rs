// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Destructive admin operations.

use chatbridge_core::BridgeError;
use chatbridge_core::types::ClearedCounts;

use crate::database::{Database, write_tx};

/// Delete every response, message, session and rate-limit record in one
/// transaction. `system_config` is kept.
pub async fn clear_all(db: &Database) -> Result<ClearedCounts, BridgeError> {
    db.call(|conn| -> Result<ClearedCounts, rusqlite::Error> {
        let tx = write_tx(conn)?;
        let responses = tx.execute("DELETE FROM responses", [])?;
        let messages = tx.execute("DELETE FROM messages", [])?;
        let sessions = tx.execute("DELETE FROM sessions", [])?;
        let rate_limits = tx.execute("DELETE FROM rate_limits", [])?;
        tx.commit()?;
        Ok(ClearedCounts {
            sessions,
            messages,
            responses,
            rate_limits,
        })
    })
    .await
}
