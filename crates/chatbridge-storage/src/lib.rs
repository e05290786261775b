// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the chatbridge relay.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, async access
//! through `tokio-rusqlite`, and the session, message, response and
//! configuration operations behind [`SqliteRelayStore`].

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteRelayStore;
pub use database::Database;
