// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `system_config` key/value operations.

use std::collections::BTreeMap;

use chatbridge_core::BridgeError;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, write_tx};

/// Every stored key and value.
pub async fn get_all(db: &Database) -> Result<BTreeMap<String, String>, BridgeError> {
    db.call(|conn| {
        let mut stmt = conn.prepare("SELECT key, value FROM system_config")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        rows.collect()
    })
    .await
}

/// One value by key.
pub async fn get(db: &Database, key: &str) -> Result<Option<String>, BridgeError> {
    let key = key.to_string();
    db.call(move |conn| {
        conn.query_row(
            "SELECT value FROM system_config WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
    })
    .await
}

/// Insert or replace every given key in one transaction.
pub async fn upsert_many(
    db: &Database,
    values: &BTreeMap<String, String>,
) -> Result<(), BridgeError> {
    let values = values.clone();
    db.call(move |conn| -> Result<(), rusqlite::Error> {
        let tx = write_tx(conn)?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO system_config (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            )?;
            for (key, value) in &values {
                stmt.execute(params![key, value])?;
            }
        }
        tx.commit()
    })
    .await
}

/// Insert keys that are absent; existing values are left alone.
/// Returns how many keys were inserted.
pub async fn seed(db: &Database, defaults: &BTreeMap<String, String>) -> Result<usize, BridgeError> {
    let defaults = defaults.clone();
    db.call(move |conn| -> Result<usize, rusqlite::Error> {
        let tx = write_tx(conn)?;
        let mut inserted = 0;
        {
            let mut stmt =
                tx.prepare("INSERT OR IGNORE INTO system_config (key, value) VALUES (?1, ?2)")?;
            for (key, value) in &defaults {
                inserted += stmt.execute(params![key, value])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    })
    .await
}
