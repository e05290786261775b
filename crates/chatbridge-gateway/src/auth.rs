// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer-key middleware for the consumer and admin route groups.
//!
//! Each group has its own key. When a group's key is not configured, every
//! request to that group is rejected (fail-closed).

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

pub use chatbridge_config::model::AuthConfig;

use crate::handlers::ApiError;

/// Why a request failed authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No key configured for this route group.
    NotConfigured,
    /// Missing or malformed `Authorization` header.
    Missing,
    /// Header present but the key does not match.
    Invalid,
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Compare the request's bearer token against `expected`.
pub fn verify_bearer(expected: Option<&str>, headers: &HeaderMap) -> Result<(), AuthFailure> {
    let Some(expected) = expected else {
        return Err(AuthFailure::NotConfigured);
    };
    match bearer_token(headers) {
        None => Err(AuthFailure::Missing),
        Some(token) if token == expected => Ok(()),
        Some(_) => Err(AuthFailure::Invalid),
    }
}

fn reject(failure: AuthFailure, group: &str) -> Response {
    let message = match failure {
        AuthFailure::NotConfigured => {
            tracing::error!(group, "no key configured -- rejecting request");
            "Authentication required".to_string()
        }
        AuthFailure::Missing => "Authentication required".to_string(),
        AuthFailure::Invalid => format!("Invalid {group} key"),
    };
    ApiError::unauthorized(message).into_response()
}

/// Guards the consumer routes (inbox, outbox) with `auth.api_key`.
pub async fn require_api_key(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Response {
    match verify_bearer(auth.api_key.as_deref(), request.headers()) {
        Ok(()) => next.run(request).await,
        Err(failure) => reject(failure, "API"),
    }
}

/// Guards the admin routes with `auth.admin_key`.
pub async fn require_admin_key(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Response {
    match verify_bearer(auth.admin_key.as_deref(), request.headers()) {
        Ok(()) => next.run(request).await,
        Err(failure) => reject(failure, "admin"),
    }
}
