// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `chatbridge serve` command implementation.
//!
//! Opens the relay database, starts the HTTP gateway and the background
//! sweeper, and runs until SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chatbridge_config::BridgeConfig;
use chatbridge_core::{BridgeError, PluginAdapter, RelayStore};
use chatbridge_gateway::{Gateway, GatewayState};
use chatbridge_ratelimit::RateLimiter;

use crate::relay::{open_relay, sweep_once};
use crate::shutdown;

/// Runs the `chatbridge serve` command.
pub async fn run_serve(config: BridgeConfig) -> Result<(), BridgeError> {
    init_tracing(&config.server.log_level);

    info!("starting chatbridge serve");

    let relay = open_relay(&config).await?;
    let cancel = shutdown::install_signal_handler();

    let sweeper = if config.relay.sweep_interval_secs > 0 {
        info!(
            interval_secs = config.relay.sweep_interval_secs,
            "background sweeper enabled"
        );
        Some(spawn_sweeper(
            relay.store.clone(),
            relay.limiter.clone(),
            Duration::from_secs(config.relay.sweep_interval_secs),
            cancel.clone(),
        ))
    } else {
        info!("background sweeper disabled");
        None
    };

    let state = GatewayState {
        store: relay.store.clone(),
        config_store: relay.store.clone(),
        limiter: relay.limiter.clone(),
        settings: relay.settings.clone(),
        auth: config.auth.clone(),
        started_at: Instant::now(),
    };
    if state.auth.api_key.is_none() {
        warn!("auth.api_key is not set; inbox and outbox will reject every request");
    }
    if state.auth.admin_key.is_none() {
        warn!("auth.admin_key is not set; admin routes will reject every request");
    }

    let gateway = Gateway::new(config.server.host.clone(), config.server.port, state);
    let addr = gateway.start().await?;
    info!(%addr, "chatbridge ready");

    cancel.cancelled().await;

    gateway.shutdown().await?;
    if let Some(handle) = sweeper
        && let Err(e) = handle.await
    {
        warn!(error = %e, "sweeper task ended abnormally");
    }
    relay.shutdown().await?;

    info!("chatbridge serve shutdown complete");
    Ok(())
}

/// Periodically remove inactive sessions and expired rate-limit records.
///
/// Failures are logged and retried on the next tick.
fn spawn_sweeper(
    store: Arc<dyn RelayStore>,
    limiter: Arc<RateLimiter>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // Skip the first immediate tick.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match sweep_once(store.as_ref(), &limiter).await {
                        Ok(report) if report.sessions > 0 || report.rate_limits > 0 => {
                            info!(
                                sessions = report.sessions,
                                rate_limits = report.rate_limits,
                                "sweep removed stale rows"
                            );
                        }
                        Ok(_) => debug!("sweep found nothing to remove"),
                        Err(e) => warn!(error = %e, "sweep failed (non-fatal)"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!("sweeper shutting down");
                    break;
                }
            }
        }
    })
}

pub(crate) fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chatbridge={log_level},warn")));

    // A second init (tests, repeated commands) is not an error.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::Relay;

    async fn relay_in(dir: &tempfile::TempDir) -> Relay {
        let mut config = BridgeConfig::default();
        config.storage.database_path = dir.path().join("relay.db").display().to_string();
        open_relay(&config).await.unwrap()
    }

    #[tokio::test]
    async fn sweeper_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let relay = relay_in(&dir).await;
        let cancel = CancellationToken::new();

        let handle = spawn_sweeper(
            relay.store.clone(),
            relay.limiter.clone(),
            Duration::from_millis(10),
            cancel.clone(),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper should stop promptly")
            .unwrap();
        relay.shutdown().await.unwrap();
    }
}
