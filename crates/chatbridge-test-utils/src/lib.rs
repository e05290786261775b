// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for chatbridge integration tests.
//!
//! Provides [`TestHarness`], a temp-database relay stack with an in-process
//! router, for fast, deterministic tests without a network listener.

pub mod harness;

pub use harness::{TEST_ADMIN_KEY, TEST_API_KEY, TestHarness, request};
