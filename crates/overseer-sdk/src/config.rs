// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker-side configuration.
//!
//! Everything a worker needs arrives through its environment: the type it
//! runs as, the channel descriptor, and the domain settings the supervisor
//! injected from the type's descriptor.

use std::time::Duration;

use overseer_protocol::{WORKER_TYPE_ENV, WorkerType};

use crate::error::{Result, SdkError};

/// Heartbeat interval override, in milliseconds.
pub const HEARTBEAT_INTERVAL_ENV: &str = "OVERSEER_HEARTBEAT_INTERVAL_MS";

/// Default heartbeat cadence.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration of one worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Type this process serves.
    pub worker_type: WorkerType,
    /// How often to beat.
    pub heartbeat_interval: Duration,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let raw_type =
            std::env::var(WORKER_TYPE_ENV).map_err(|_| SdkError::MissingEnvVar(WORKER_TYPE_ENV))?;
        let worker_type =
            WorkerType::try_from(raw_type.as_str()).map_err(|_| SdkError::InvalidEnvVar {
                variable: WORKER_TYPE_ENV,
                value: raw_type,
            })?;

        let heartbeat_interval = match std::env::var(HEARTBEAT_INTERVAL_ENV) {
            Ok(raw) => {
                let millis: u64 = raw.parse().map_err(|_| SdkError::InvalidEnvVar {
                    variable: HEARTBEAT_INTERVAL_ENV,
                    value: raw,
                })?;
                Duration::from_millis(millis)
            }
            Err(_) => DEFAULT_HEARTBEAT_INTERVAL,
        };

        Ok(Self {
            worker_type,
            heartbeat_interval,
        })
    }
}
