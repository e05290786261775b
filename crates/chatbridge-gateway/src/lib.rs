// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the chatbridge relay.
//!
//! Anonymous chat clients submit messages and poll responses; the consumer
//! (API key) drains the inbox and posts to the outbox; operators (admin key)
//! list sessions, tune settings and clear state. The gateway only sequences
//! calls: rate limiter first, then the store.

pub mod auth;
pub mod handlers;
pub mod server;

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::Router;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

use chatbridge_core::{AdapterType, BridgeError, HealthStatus, PluginAdapter};

pub use crate::server::{GatewayState, build_router};

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// The HTTP server as a managed component.
///
/// [`start`](Self::start) binds and serves in a background task;
/// [`shutdown`](PluginAdapter::shutdown) stops accepting connections and
/// waits for in-flight requests to finish.
pub struct Gateway {
    host: String,
    port: u16,
    state: GatewayState,
    running: Mutex<Option<Running>>,
}

impl Gateway {
    pub fn new(host: impl Into<String>, port: u16, state: GatewayState) -> Self {
        Self {
            host: host.into(),
            port,
            state,
            running: Mutex::new(None),
        }
    }

    /// A router over this gateway's state, for in-process callers.
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Bind and start serving. Returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr, BridgeError> {
        let mut running = self.running.lock().await;
        if let Some(r) = running.as_ref() {
            return Ok(r.addr);
        }

        let listener = server::bind(&self.host, self.port).await?;
        let addr = listener
            .local_addr()
            .map_err(|e| BridgeError::Internal(format!("gateway has no local address: {e}")))?;
        let (stop, stopped) = oneshot::channel::<()>();
        let router = self.router();

        let handle = tokio::spawn(async move {
            let shutdown = async {
                let _ = stopped.await;
            };
            if let Err(e) = server::serve(listener, router, shutdown).await {
                tracing::error!("gateway server error: {e}");
            }
        });

        *running = Some(Running { addr, stop, handle });
        Ok(addr)
    }

    /// Bound address while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.addr)
    }
}

#[async_trait]
impl PluginAdapter for Gateway {
    fn name(&self) -> &str {
        "http-gateway"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Gateway
    }

    async fn health_check(&self) -> Result<HealthStatus, BridgeError> {
        let running = self.running.lock().await;
        match running.as_ref() {
            Some(r) if !r.handle.is_finished() => Ok(HealthStatus::Healthy),
            Some(_) => Ok(HealthStatus::Unhealthy("server task exited".to_string())),
            None => Ok(HealthStatus::Unhealthy("server not started".to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), BridgeError> {
        let Some(running) = self.running.lock().await.take() else {
            return Ok(());
        };
        let _ = running.stop.send(());
        running
            .handle
            .await
            .map_err(|e| BridgeError::Internal(format!("gateway task failed: {e}")))?;
        tracing::info!("gateway stopped");
        Ok(())
    }
}
