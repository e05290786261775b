// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request limiting for the chatbridge relay.
//!
//! A fixed-window counter per (client address, endpoint name), persisted in
//! the `rate_limits` table of the relay database. A client can burst up to
//! twice the limit across a window boundary; the per-endpoint limits are
//! tuned for that behavior.

pub mod limiter;

pub use limiter::RateLimiter;
