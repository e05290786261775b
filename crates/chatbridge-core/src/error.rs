// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the chatbridge relay.

use strum::Display;
use thiserror::Error;

/// The primary error type returned by the store, the rate limiter and the
/// settings layer.
///
/// Rate limiting is deliberately absent: an exhausted window is reported as
/// [`RateDecision::Exceeded`](crate::types::RateDecision), not as an error.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration errors (invalid TOML, unparsable settings values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed caller input: bad session id, empty or oversized text.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// The operation needs an existing session and none was found.
    #[error("unknown session: {session_id}")]
    UnknownSession { session_id: String },

    /// A direct session create collided with an existing session id.
    #[error("session already exists: {session_id}")]
    DuplicateSession { session_id: String },

    /// Storage backend errors (connection, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A storage operation did not complete within its deadline.
    #[error("storage operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`BridgeError`], used by outer layers to pick
/// a transport status without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    UnknownSession,
    Conflict,
    Storage,
    Internal,
}

impl BridgeError {
    /// Shorthand for an [`BridgeError::InvalidInput`] with the given message.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Wrap any storage-layer error.
    pub fn storage<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            source: Box::new(source),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::UnknownSession { .. } => ErrorKind::UnknownSession,
            Self::DuplicateSession { .. } => ErrorKind::Conflict,
            Self::Storage { .. } | Self::Timeout { .. } => ErrorKind::Storage,
            Self::Config(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True when the caller can fix the request and retry.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidInput | ErrorKind::UnknownSession | ErrorKind::Conflict
        )
    }
}
