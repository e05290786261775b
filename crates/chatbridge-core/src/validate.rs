// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Input validation applied before anything reaches the store.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::BridgeError;

/// Longest accepted session identifier, in bytes (the pattern is ASCII-only).
pub const MAX_SESSION_ID_LENGTH: usize = 64;

/// Default upper bound on message and response text, in characters.
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 10_000;

static SESSION_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^session_[A-Za-z0-9_]+$").unwrap());

/// A caller-supplied session identifier that passed format validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Validate and wrap a raw identifier. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(BridgeError::invalid("session id is required"));
        }
        if raw.len() > MAX_SESSION_ID_LENGTH {
            return Err(BridgeError::invalid(format!(
                "session id exceeds {MAX_SESSION_ID_LENGTH} characters"
            )));
        }
        if !SESSION_ID_PATTERN.is_match(raw) {
            return Err(BridgeError::invalid("invalid session id"));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate message or response text and return it trimmed.
///
/// The trimmed text must be between 1 and `max_len` characters inclusive.
pub fn validate_text(raw: &str, max_len: usize) -> Result<&str, BridgeError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(BridgeError::invalid("message must not be empty"));
    }
    let len = text.chars().count();
    if len > max_len {
        return Err(BridgeError::invalid(format!(
            "message is {len} characters, maximum is {max_len}"
        )));
    }
    Ok(text)
}
