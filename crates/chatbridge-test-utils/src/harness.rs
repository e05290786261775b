// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the full relay stack (temp SQLite database,
//! store, rate limiter, live settings and HTTP router) and offers helpers
//! that drive the router in-process with `tower::ServiceExt::oneshot`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::ConnectInfo;
use axum::extract::connect_info::MockConnectInfo;
use http::{Method, Request, StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;

use chatbridge_config::model::AuthConfig;
use chatbridge_config::{RelaySettings, SettingsHandle};
use chatbridge_core::{BridgeError, Endpoint};
use chatbridge_gateway::{GatewayState, build_router};
use chatbridge_ratelimit::RateLimiter;
use chatbridge_storage::{Database, SqliteRelayStore};

/// Bearer key accepted on consumer routes.
pub const TEST_API_KEY: &str = "test-api-key";
/// Bearer key accepted on admin routes.
pub const TEST_ADMIN_KEY: &str = "test-admin-key";
/// Peer address attached to requests that do not pick their own.
pub const DEFAULT_CLIENT: ([u8; 4], u16) = ([127, 0, 0, 1], 40000);

const OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    settings: RelaySettings,
    auth: AuthConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            settings: RelaySettings::default(),
            auth: AuthConfig {
                api_key: Some(TEST_API_KEY.to_string()),
                admin_key: Some(TEST_ADMIN_KEY.to_string()),
            },
        }
    }

    /// Start from the given settings instead of the defaults.
    pub fn with_settings(mut self, settings: RelaySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Override one endpoint's per-window limit.
    pub fn with_rate_limit(mut self, endpoint: Endpoint, limit: u32) -> Self {
        let slot = match endpoint {
            Endpoint::Messages => &mut self.settings.rate_limit_messages,
            Endpoint::Inbox => &mut self.settings.rate_limit_inbox,
            Endpoint::Outbox => &mut self.settings.rate_limit_outbox,
            Endpoint::Responses => &mut self.settings.rate_limit_responses,
            Endpoint::Sessions => &mut self.settings.rate_limit_sessions,
        };
        *slot = limit;
        self
    }

    /// Replace the bearer keys (`None` leaves that route group locked).
    pub fn with_auth(mut self, api_key: Option<&str>, admin_key: Option<&str>) -> Self {
        self.auth = AuthConfig {
            api_key: api_key.map(str::to_string),
            admin_key: admin_key.map(str::to_string),
        };
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, BridgeError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| BridgeError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("relay.db");
        let db_path = db_path.to_string_lossy().to_string();

        let db = Database::open(&db_path).await?;
        let settings = SettingsHandle::new(self.settings);
        let store = Arc::new(SqliteRelayStore::new(
            db,
            Arc::new(settings.clone()),
            OP_TIMEOUT,
        ));
        let limiter = Arc::new(
            RateLimiter::open(&db_path, Arc::new(settings.clone()), OP_TIMEOUT).await?,
        );

        let state = GatewayState {
            store: store.clone(),
            config_store: store.clone(),
            limiter: limiter.clone(),
            settings: settings.clone(),
            auth: self.auth,
            started_at: Instant::now(),
        };

        Ok(TestHarness {
            store,
            limiter,
            settings,
            state,
            db_path,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete relay environment on a temp database.
pub struct TestHarness {
    /// SQLite relay store (temp DB, cleaned up on drop).
    pub store: Arc<SqliteRelayStore>,
    /// Rate limiter on its own connection to the same file.
    pub limiter: Arc<RateLimiter>,
    /// Live settings shared by store, limiter and router.
    pub settings: SettingsHandle,
    /// Gateway state, for building routers or a [`chatbridge_gateway::Gateway`].
    pub state: GatewayState,
    /// Path of the temp database file.
    pub db_path: String,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Harness with default settings and test keys.
    pub async fn new() -> Result<Self, BridgeError> {
        Self::builder().build().await
    }

    /// The gateway router. Requests without their own `ConnectInfo`
    /// appear to come from [`DEFAULT_CLIENT`].
    pub fn router(&self) -> Router {
        build_router(self.state.clone()).layer(MockConnectInfo(SocketAddr::from(DEFAULT_CLIENT)))
    }

    /// Send one request through a fresh router; returns status and JSON body
    /// (`Value::Null` when the body is empty or not JSON).
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = match self.router().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .map(|bytes| serde_json::from_slice(&bytes).unwrap_or(Value::Null))
            .unwrap_or(Value::Null);
        (status, body)
    }

    /// GET `uri`, optionally with a bearer key.
    pub async fn get(&self, uri: &str, key: Option<&str>) -> (StatusCode, Value) {
        self.send(request(Method::GET, uri, key, None, None)).await
    }

    /// POST a JSON body to `uri`, optionally with a bearer key.
    pub async fn post_json(&self, uri: &str, key: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(request(Method::POST, uri, key, Some(body), None))
            .await
    }

    /// DELETE `uri` with a bearer key.
    pub async fn delete(&self, uri: &str, key: Option<&str>) -> (StatusCode, Value) {
        self.send(request(Method::DELETE, uri, key, None, None)).await
    }

    /// POST from a specific peer address.
    pub async fn post_json_from(
        &self,
        client: SocketAddr,
        uri: &str,
        body: Value,
    ) -> (StatusCode, Value) {
        self.send(request(Method::POST, uri, None, Some(body), Some(client)))
            .await
    }
}

/// Build a request with optional bearer key, JSON body and peer address.
pub fn request(
    method: Method,
    uri: &str,
    key: Option<&str>,
    body: Option<Value>,
    client: Option<SocketAddr>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let mut request = match builder.body(body) {
        Ok(request) => request,
        Err(e) => panic!("invalid test request for {uri}: {e}"),
    };
    if let Some(addr) = client {
        request.extensions_mut().insert(ConnectInfo(addr));
    }
    request
}
