// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Overseer Core - supervisor daemon.
//!
//! Spawns one set of each declared worker type, owns all inter-worker
//! routing, and keeps the fleet alive. Workers are separate processes
//! launched from the binary named by `OVERSEER_WORKER_BIN`.

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use overseer_core::config::Config;
use overseer_core::spawn::ProcessLauncher;
use overseer_core::supervisor::Supervisor;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("overseer_core=info".parse().unwrap()),
        )
        .init();

    info!("Starting Overseer Core");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        worker_bin = %config.worker_bin.display(),
        declared_types = config.workers.len(),
        watchdog_poll_secs = config.watchdog_poll.as_secs(),
        heartbeat_timeout_secs = config.heartbeat_timeout.as_secs(),
        "Configuration loaded"
    );

    let launcher = Arc::new(ProcessLauncher::new(config.worker_bin.clone()));
    let supervisor = Supervisor::new(config, launcher);

    // Ctrl-C drives graceful shutdown
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            signal_token.cancel();
        }
    });

    supervisor.run(shutdown).await?;

    info!("Shutdown complete");
    Ok(())
}
