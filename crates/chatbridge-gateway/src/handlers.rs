// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the relay API.
//!
//! Every JSON reply uses one envelope: `{success, message, timestamp, data}`
//! on success and `{success: false, error}` on failure. Rate-limited routes
//! check the limiter before touching the store.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    Json,
    extract::{
        ConnectInfo, FromRequestParts, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use chatbridge_config::RelaySettings;
use chatbridge_core::time::{now_timestamp, parse_since};
use chatbridge_core::types::{
    ClearedCounts, MessageView, RateLimitInfo, RateLimitRecord, ResponseView, SessionView,
    USER_MESSAGE_KIND,
};
use chatbridge_core::validate::validate_text;
use chatbridge_core::{
    BridgeError, ConfigProvider, Endpoint, ErrorKind, HealthStatus, Page, Pagination,
    PluginAdapter, SessionId,
};

use crate::server::GatewayState;

/// Fallback rate-limit key when the peer address is unavailable.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: &'static str,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

fn success<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        message: "Success",
        timestamp: now_timestamp(),
        data: Some(data),
    })
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// A failed request, already classified to a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn rate_limited() -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        match (err.kind(), err) {
            (_, BridgeError::InvalidInput { message }) => Self::bad_request(message),
            // 400 rather than 404 so pollers cannot learn which sessions exist.
            (ErrorKind::UnknownSession, _) => Self::bad_request("Invalid session"),
            (ErrorKind::Conflict, err) => Self::new(StatusCode::CONFLICT, err.to_string()),
            (_, err) => {
                error!(error = %err, "request failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                success: false,
                error: self.message,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

/// Peer IP used as the rate-limit key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let addr = ConnectInfo::<SocketAddr>::from_request_parts(parts, state)
            .await
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|_| UNKNOWN_CLIENT.to_string());
        Ok(Self(addr))
    }
}

fn user_agent(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok())
}

async fn enforce_limit(
    state: &GatewayState,
    client: &ClientAddr,
    endpoint: Endpoint,
) -> Result<(), ApiError> {
    let decision = state.limiter.check_endpoint(&client.0, endpoint).await?;
    if decision.is_permitted() {
        Ok(())
    } else {
        debug!(client = %client.0, %endpoint, "rate limit exceeded");
        Err(ApiError::rate_limited())
    }
}

fn optional_since(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, BridgeError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => parse_since(raw).map(Some),
    }
}

fn required<'a>(field: &'a str, what: &str) -> Result<&'a str, ApiError> {
    let field = field.trim();
    if field.is_empty() {
        Err(ApiError::bad_request(format!("Missing {what}")))
    } else {
        Ok(field)
    }
}

/// Pagination metadata returned alongside list results.
#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
    pub has_more: bool,
}

fn split_page<T>(items: Vec<T>, total: i64, page: Pagination) -> (Vec<T>, PageMeta) {
    page_parts(Page::new(items, total, page))
}

fn page_parts<T>(page: Page<T>) -> (Vec<T>, PageMeta) {
    let Page {
        items,
        total,
        limit,
        offset,
        has_more,
    } = page;
    (
        items,
        PageMeta {
            total,
            limit,
            offset,
            has_more,
        },
    )
}

// --- client routes ---------------------------------------------------------

/// Request body for POST /api/v1/messages.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MessageRequest {
    pub session_id: String,
    pub message: String,
    pub timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageAccepted {
    pub message_id: i64,
    pub session_id: String,
    pub timestamp: String,
    pub uid: String,
    pub is_new_user: bool,
}

/// POST /api/v1/messages
///
/// Creates the session on first contact, stores the message and bumps the
/// session's activity.
pub async fn post_messages(
    State(state): State<GatewayState>,
    client: ClientAddr,
    headers: HeaderMap,
    body: Result<Json<MessageRequest>, JsonRejection>,
) -> ApiResult<MessageAccepted> {
    enforce_limit(&state, &client, Endpoint::Messages).await?;

    let Json(body) = body.map_err(|_| ApiError::bad_request("Invalid JSON"))?;
    if body.session_id.trim().is_empty() || body.message.trim().is_empty() {
        return Err(ApiError::bad_request("Missing required fields"));
    }
    let session_id = SessionId::parse(&body.session_id)?;
    let text = validate_text(&body.message, state.settings.max_message_length())?;

    let lookup = state
        .store
        .get_or_create_uid(&session_id, Some(&client.0), user_agent(&headers))
        .await?;
    let message_id = state
        .store
        .create_message(&session_id, text, USER_MESSAGE_KIND)
        .await?;
    state.store.update_session_activity(&session_id).await?;

    Ok(success(MessageAccepted {
        message_id,
        session_id: session_id.into_inner(),
        timestamp: body.timestamp.unwrap_or_else(now_timestamp),
        uid: lookup.uid,
        is_new_user: lookup.is_new,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponsesQuery {
    #[serde(default)]
    pub session_id: String,
    pub since: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponses {
    pub session_id: String,
    pub responses: Vec<ResponseView>,
}

/// GET /api/v1/responses
///
/// Polling an unknown session creates it with an empty history.
pub async fn get_responses(
    State(state): State<GatewayState>,
    client: ClientAddr,
    headers: HeaderMap,
    query: Result<Query<ResponsesQuery>, QueryRejection>,
) -> ApiResult<SessionResponses> {
    enforce_limit(&state, &client, Endpoint::Responses).await?;

    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let session_id = SessionId::parse(required(&query.session_id, "session_id")?)?;
    let since = optional_since(query.since.as_deref())?;

    state
        .store
        .get_or_create_uid(&session_id, Some(&client.0), user_agent(&headers))
        .await?;
    let responses = state.store.get_session_responses(&session_id, since).await?;

    Ok(success(SessionResponses {
        session_id: session_id.into_inner(),
        responses,
    }))
}

// --- consumer routes -------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub since: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Inbox {
    pub messages: Vec<MessageView>,
    pub pagination: PageMeta,
}

/// GET /api/v1/inbox
///
/// Returns unprocessed messages oldest first and marks every returned
/// message processed in the same transaction, so concurrent pollers never
/// receive the same message.
pub async fn get_inbox(
    State(state): State<GatewayState>,
    client: ClientAddr,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Inbox> {
    enforce_limit(&state, &client, Endpoint::Inbox).await?;

    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let page = Pagination::clamped(query.limit, query.offset);
    let since = optional_since(query.since.as_deref())?;

    let claimed = state.store.claim_unprocessed_messages(page, since).await?;
    let (messages, pagination) = page_parts(claimed);
    Ok(success(Inbox {
        messages,
        pagination,
    }))
}

/// Request body for POST /api/v1/outbox.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OutboxRequest {
    pub session_id: String,
    pub response: String,
    /// `0` and absent both mean "not a reply to a specific message".
    pub message_id: Option<i64>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResponseAccepted {
    pub response_id: i64,
    pub session_id: String,
    pub timestamp: String,
}

/// POST /api/v1/outbox
pub async fn post_outbox(
    State(state): State<GatewayState>,
    client: ClientAddr,
    body: Result<Json<OutboxRequest>, JsonRejection>,
) -> ApiResult<ResponseAccepted> {
    enforce_limit(&state, &client, Endpoint::Outbox).await?;

    let Json(body) = body.map_err(|_| ApiError::bad_request("Missing required fields"))?;
    if body.session_id.trim().is_empty() || body.response.trim().is_empty() {
        return Err(ApiError::bad_request("Missing required fields"));
    }
    let session_id = SessionId::parse(&body.session_id)?;
    // Consumer replies are not capped by `max_message_length`.
    let text = body.response.trim();
    let message_id = body.message_id.filter(|id| *id != 0);

    let response_id = state
        .store
        .create_response(&session_id, text, message_id)
        .await?;

    Ok(success(ResponseAccepted {
        response_id,
        session_id: session_id.into_inner(),
        timestamp: body.timestamp.unwrap_or_else(now_timestamp),
    }))
}

// --- admin routes ----------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct SessionsQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    /// `"true"` (default) restricts the listing to recently active sessions.
    pub active: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionList {
    pub sessions: Vec<SessionView>,
    pub pagination: PageMeta,
}

/// GET /api/v1/sessions
pub async fn get_sessions(
    State(state): State<GatewayState>,
    client: ClientAddr,
    query: Result<Query<SessionsQuery>, QueryRejection>,
) -> ApiResult<SessionList> {
    enforce_limit(&state, &client, Endpoint::Sessions).await?;

    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let page = Pagination::clamped(query.limit, query.offset);
    let active_only = query.active.as_deref().unwrap_or("true") == "true";

    let sessions = state.store.get_active_sessions(page, active_only).await?;
    let total = state.store.get_session_count(active_only).await?;

    let (sessions, pagination) = split_page(sessions, total, page);
    Ok(success(SessionList {
        sessions,
        pagination,
    }))
}

#[derive(Debug, Serialize)]
pub struct CleanupSummary {
    pub cleaned_count: usize,
    pub expired_rate_limits: usize,
    pub message: String,
}

/// POST /api/v1/cleanup
///
/// Removes inactive sessions (with their messages and responses) and
/// expired rate-limit records.
pub async fn post_cleanup(State(state): State<GatewayState>) -> ApiResult<CleanupSummary> {
    let cleaned_count = state.store.cleanup_inactive_sessions().await?;
    let expired_rate_limits = state.limiter.cleanup_expired_limits().await?;
    info!(cleaned_count, expired_rate_limits, "admin cleanup");

    Ok(success(CleanupSummary {
        cleaned_count,
        expired_rate_limits,
        message: format!("Cleaned up {cleaned_count} inactive sessions"),
    }))
}

#[derive(Debug, Serialize)]
pub struct ClearSummary {
    pub message: &'static str,
    pub cleared: ClearedCounts,
}

/// POST /api/v1/clear_data
pub async fn post_clear_data(
    State(state): State<GatewayState>,
    client: ClientAddr,
) -> ApiResult<ClearSummary> {
    let cleared = state.store.clear_all().await?;
    warn!(admin = %client.0, ?cleared, "all relay data cleared");

    Ok(success(ClearSummary {
        message: "All data cleared successfully",
        cleared,
    }))
}

/// GET /api/v1/config
pub async fn get_config(
    State(state): State<GatewayState>,
) -> ApiResult<BTreeMap<String, String>> {
    let config = state.config_store.get_all_config().await?;
    Ok(success(config))
}

fn stringify_config(
    values: BTreeMap<String, serde_json::Value>,
) -> Result<BTreeMap<String, String>, ApiError> {
    values
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => {
                    return Err(ApiError::bad_request(format!(
                        "value for `{key}` must be a string, number or boolean"
                    )));
                }
            };
            Ok((key, value))
        })
        .collect()
}

/// POST /api/v1/config
///
/// The merged settings are validated before anything is written; on success
/// the values are persisted and the live settings are swapped.
pub async fn post_config(
    State(state): State<GatewayState>,
    body: Result<Json<BTreeMap<String, serde_json::Value>>, JsonRejection>,
) -> ApiResult<RelaySettings> {
    let Json(values) = body.map_err(|_| ApiError::bad_request("Invalid JSON"))?;
    if values.is_empty() {
        return Err(ApiError::bad_request("Invalid JSON"));
    }
    let values = stringify_config(values)?;

    let current = state.settings.load();
    let next = RelaySettings::from_map(&values, &current)?;

    state.config_store.update_config(&values).await?;
    state.settings.replace(next.clone());

    Ok(success(next))
}

#[derive(Debug, Serialize)]
pub struct RateLimitList {
    pub rate_limits: Vec<RateLimitRecord>,
}

/// GET /api/v1/rate_limits
pub async fn get_rate_limits(State(state): State<GatewayState>) -> ApiResult<RateLimitList> {
    let rate_limits = state.limiter.get_all_rate_limits().await?;
    Ok(success(RateLimitList { rate_limits }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RateLimitKey {
    pub client_address: String,
    pub endpoint: String,
}

#[derive(Debug, Serialize)]
pub struct RateLimitStatus {
    pub client_address: String,
    pub endpoint: String,
    #[serde(flatten)]
    pub info: RateLimitInfo,
}

/// GET /api/v1/rate_limits/status
pub async fn get_rate_limit_status(
    State(state): State<GatewayState>,
    query: Result<Query<RateLimitKey>, QueryRejection>,
) -> ApiResult<RateLimitStatus> {
    let Query(key) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let client_address = required(&key.client_address, "client_address")?.to_string();
    let endpoint = required(&key.endpoint, "endpoint")?.to_string();

    let info = state
        .limiter
        .get_rate_limit_info(&client_address, &endpoint)
        .await?;

    Ok(success(RateLimitStatus {
        client_address,
        endpoint,
        info,
    }))
}

#[derive(Debug, Serialize)]
pub struct RateLimitReset {
    pub client_address: String,
    pub endpoint: String,
    pub reset: bool,
}

/// DELETE /api/v1/rate_limits
pub async fn delete_rate_limit(
    State(state): State<GatewayState>,
    query: Result<Query<RateLimitKey>, QueryRejection>,
) -> ApiResult<RateLimitReset> {
    let Query(key) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let client_address = required(&key.client_address, "client_address")?.to_string();
    let endpoint = required(&key.endpoint, "endpoint")?.to_string();

    let reset = state
        .limiter
        .reset_rate_limit(&client_address, &endpoint)
        .await?;
    info!(%client_address, %endpoint, reset, "rate limit reset");

    Ok(success(RateLimitReset {
        client_address,
        endpoint,
        reset,
    }))
}

// --- health ----------------------------------------------------------------

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub store: String,
    pub rate_limiter: String,
}

fn describe(status: &Result<HealthStatus, BridgeError>) -> (bool, String) {
    match status {
        Ok(HealthStatus::Healthy) => (true, "healthy".to_string()),
        Ok(HealthStatus::Degraded(why)) => (true, format!("degraded: {why}")),
        Ok(HealthStatus::Unhealthy(why)) => (false, format!("unhealthy: {why}")),
        Err(e) => (false, format!("unhealthy: {e}")),
    }
}

/// GET /health
///
/// Unauthenticated. 200 when both the store and the limiter answer,
/// 503 otherwise.
pub async fn get_health(State(state): State<GatewayState>) -> (StatusCode, Json<HealthResponse>) {
    let (store_ok, store) = describe(&state.store.health_check().await);
    let (limiter_ok, rate_limiter) = describe(&state.limiter.health_check().await);
    let healthy = store_ok && limiter_ok;

    let body = HealthResponse {
        status: if healthy { "ok" } else { "unavailable" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        store,
        rate_limiter,
    };
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_request_tolerates_missing_fields() {
        let req: MessageRequest = serde_json::from_str(r#"{"message": "hi"}"#).unwrap();
        assert_eq!(req.message, "hi");
        assert!(req.session_id.is_empty());
        assert!(req.timestamp.is_none());
    }

    #[test]
    fn outbox_request_reads_message_id() {
        let req: OutboxRequest = serde_json::from_str(
            r#"{"session_id": "session_a", "response": "ok", "message_id": 7}"#,
        )
        .unwrap();
        assert_eq!(req.message_id, Some(7));
    }

    #[test]
    fn invalid_input_maps_to_400_with_message() {
        let err = ApiError::from(BridgeError::invalid("invalid session id"));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "invalid session id");
    }

    #[test]
    fn unknown_session_does_not_leak_as_404() {
        let err = ApiError::from(BridgeError::UnknownSession {
            session_id: "session_x".into(),
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Invalid session");
    }

    #[test]
    fn duplicate_maps_to_conflict() {
        let err = ApiError::from(BridgeError::DuplicateSession {
            session_id: "session_x".into(),
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn storage_failures_are_hidden_behind_500() {
        let err = ApiError::from(BridgeError::Timeout {
            duration: std::time::Duration::from_secs(5),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Internal server error");
    }

    #[test]
    fn error_body_serializes() {
        let body = ErrorResponse {
            success: false,
            error: "Rate limit exceeded".into(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Rate limit exceeded");
    }

    #[test]
    fn blank_since_means_no_filter() {
        assert!(optional_since(None).unwrap().is_none());
        assert!(optional_since(Some("  ")).unwrap().is_none());
        assert!(optional_since(Some("2026-01-01 00:00:00")).unwrap().is_some());
        assert!(optional_since(Some("yesterday")).is_err());
    }

    #[test]
    fn config_values_are_stringified() {
        let mut raw = BTreeMap::new();
        raw.insert("session_timeout".to_string(), serde_json::json!(600));
        raw.insert("theme".to_string(), serde_json::json!("dark"));
        raw.insert("enabled".to_string(), serde_json::json!(true));
        let values = stringify_config(raw).unwrap();
        assert_eq!(values["session_timeout"], "600");
        assert_eq!(values["theme"], "dark");
        assert_eq!(values["enabled"], "true");

        let mut nested = BTreeMap::new();
        nested.insert("x".to_string(), serde_json::json!({"a": 1}));
        assert_eq!(
            stringify_config(nested).unwrap_err().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
