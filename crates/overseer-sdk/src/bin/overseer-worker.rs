// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Overseer reference worker.
//!
//! One binary serves every declared worker type: the supervisor passes the
//! type through the environment and the matching handler table is wired to
//! the inherited channel.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use overseer_protocol::{WorkerType, inherited_channel};
use overseer_sdk::{
    ProjectStore, WorkerConfig, WorkerRuntime, database_handlers, graphql_handlers, http_handlers,
    queue_handlers,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("overseer_sdk=info".parse().unwrap())
                .add_directive("overseer_worker=info".parse().unwrap()),
        )
        .init();

    let config = WorkerConfig::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    let handlers = match config.worker_type {
        WorkerType::Database => database_handlers(Arc::new(ProjectStore::new())),
        WorkerType::Http => http_handlers(),
        WorkerType::Queue => queue_handlers(),
        WorkerType::Graphql => graphql_handlers(),
    };

    let runtime = WorkerRuntime::new(config.worker_type, handlers)
        .with_heartbeat_interval(config.heartbeat_interval);
    info!(
        instance_id = %runtime.instance_id(),
        worker_type = %config.worker_type,
        "Worker starting"
    );

    let channel = inherited_channel()?;
    if let Err(e) = runtime.run(channel).await {
        error!(error = %e, "Worker runtime failed");
        std::process::exit(1);
    }

    info!("Worker shut down cleanly");
    Ok(())
}
