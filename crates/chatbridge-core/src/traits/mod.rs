// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the relay core and its callers.

pub mod adapter;
pub mod config;
pub mod store;

pub use adapter::PluginAdapter;
pub use config::{ConfigProvider, ConfigStore};
pub use store::RelayStore;
