// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use chatbridge_config::SettingsHandle;
use chatbridge_core::{BridgeError, ConfigStore, RelayStore};
use chatbridge_ratelimit::RateLimiter;

use crate::auth::{AuthConfig, require_admin_key, require_api_key};
use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Session, message and response bookkeeping.
    pub store: Arc<dyn RelayStore>,
    /// Persistent `system_config` table.
    pub config_store: Arc<dyn ConfigStore>,
    pub limiter: Arc<RateLimiter>,
    /// Live relay settings; replaced by the admin config route.
    pub settings: SettingsHandle,
    pub auth: AuthConfig,
    pub started_at: Instant,
}

/// Build the full router.
///
/// - public: `GET /health`, `POST /api/v1/messages`, `GET /api/v1/responses`
/// - API key: `GET /api/v1/inbox`, `POST /api/v1/outbox`
/// - admin key: sessions, cleanup, clear_data, config, rate_limits
pub fn build_router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/api/v1/messages", post(handlers::post_messages))
        .route("/api/v1/responses", get(handlers::get_responses));

    let api_routes = Router::new()
        .route("/api/v1/inbox", get(handlers::get_inbox))
        .route("/api/v1/outbox", post(handlers::post_outbox))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            require_api_key,
        ));

    let admin_routes = Router::new()
        .route("/api/v1/sessions", get(handlers::get_sessions))
        .route("/api/v1/cleanup", post(handlers::post_cleanup))
        .route("/api/v1/clear_data", post(handlers::post_clear_data))
        .route(
            "/api/v1/config",
            get(handlers::get_config).post(handlers::post_config),
        )
        .route(
            "/api/v1/rate_limits",
            get(handlers::get_rate_limits).delete(handlers::delete_rate_limit),
        )
        .route(
            "/api/v1/rate_limits/status",
            get(handlers::get_rate_limit_status),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            require_admin_key,
        ));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(admin_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind `host:port`. Port 0 picks a free port.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener, BridgeError> {
    let addr = format!("{host}:{port}");
    TcpListener::bind(&addr)
        .await
        .map_err(|e| BridgeError::Internal(format!("failed to bind gateway to {addr}: {e}")))
}

/// Serve `router` on `listener` until `shutdown` resolves.
///
/// Peer addresses are attached to each request for rate-limit keys.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<(), BridgeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("gateway listening on {addr}");
    }
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|e| BridgeError::Internal(format!("gateway server error: {e}")))
}
