// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chatbridge - a rate-limited relay between web chat sessions and a bot
//! backend.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod relay;
mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use chatbridge_config::BridgeConfig;
use chatbridge_core::BridgeError;

/// Chatbridge - relay chat sessions to a bot backend.
#[derive(Parser, Debug)]
#[command(name = "chatbridge", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP relay server.
    Serve,
    /// Remove inactive sessions and expired rate-limit records once, then exit.
    Cleanup,
    /// Print the effective configuration (keys redacted).
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => chatbridge_config::load_and_validate_path(path),
        None => chatbridge_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            chatbridge_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Cleanup) => run_cleanup(config).await,
        Some(Commands::Config) => print_config(&config),
        None => {
            println!("chatbridge: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Runs the `chatbridge cleanup` command.
async fn run_cleanup(config: BridgeConfig) -> Result<(), BridgeError> {
    serve::init_tracing(&config.server.log_level);

    let relay = relay::open_relay(&config).await?;
    let report = relay::sweep_once(relay.store.as_ref(), &relay.limiter).await?;
    relay.shutdown().await?;

    println!(
        "removed {} inactive sessions and {} expired rate-limit records",
        report.sessions, report.rate_limits
    );
    Ok(())
}

fn redacted(config: &BridgeConfig) -> BridgeConfig {
    let mut shown = config.clone();
    let mask = |key: &mut Option<String>| {
        if key.is_some() {
            *key = Some("[REDACTED]".to_string());
        }
    };
    mask(&mut shown.auth.api_key);
    mask(&mut shown.auth.admin_key);
    shown
}

fn print_config(config: &BridgeConfig) -> Result<(), BridgeError> {
    let rendered = toml::to_string_pretty(&redacted(config))
        .map_err(|e| BridgeError::Config(format!("failed to render configuration: {e}")))?;
    print!("{rendered}");
    Ok(())
}
