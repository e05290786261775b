// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules, one per table group.

pub mod admin;
pub mod config;
pub mod messages;
pub mod responses;
pub mod sessions;
