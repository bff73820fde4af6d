// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Supervisor configuration.
//!
//! The worker-type descriptor table is loaded once at startup and is
//! immutable for the life of the run. Each descriptor carries the flat
//! key/value map injected into the child environment; the defaults mirror
//! the reference deployment (MongoDB on localhost, HTTP on 4000, GraphQL
//! on 4001, AMQP on localhost).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use overseer_protocol::WorkerType;

/// Static descriptor for one declared worker type.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    /// The declared type.
    pub worker_type: WorkerType,
    /// Desired instance count, >= 1.
    pub count: usize,
    /// Flat key/value configuration injected into each child's environment.
    pub config: BTreeMap<String, String>,
}

impl WorkerSpec {
    /// Descriptor with the reference defaults for a worker type.
    pub fn with_defaults(worker_type: WorkerType, count: usize) -> Self {
        Self {
            worker_type,
            count,
            config: default_config(worker_type),
        }
    }
}

/// Reference environment for a worker type.
pub fn default_config(worker_type: WorkerType) -> BTreeMap<String, String> {
    let mut config = BTreeMap::new();
    match worker_type {
        WorkerType::Database => {
            config.insert("db_url".into(), "mongodb://localhost:27017".into());
            config.insert("db_name".into(), "projects".into());
            config.insert("collection_name".into(), "projects".into());
        }
        WorkerType::Http => {
            config.insert("port".into(), "4000".into());
            config.insert("jwt_secret".into(), String::new());
        }
        WorkerType::Queue => {
            config.insert("consumeQueue".into(), "projects.consume".into());
            config.insert(
                "consumeCompensationQueue".into(),
                "projects.consume.compensation".into(),
            );
            config.insert("produceQueue".into(), "projects.produce".into());
            config.insert("rabbitMqUrl".into(), "amqp://localhost".into());
        }
        WorkerType::Graphql => {
            config.insert("graphql_port".into(), "4001".into());
            config.insert("jwt_secret".into(), String::new());
        }
    }
    config
}

/// Supervisor settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the worker binary the spawn engine launches.
    pub worker_bin: PathBuf,
    /// Declared worker types, spawned in order at startup.
    pub workers: Vec<WorkerSpec>,
    /// Watchdog poll interval.
    pub watchdog_poll: Duration,
    /// Time without a heartbeat before a worker is restarted.
    pub heartbeat_timeout: Duration,
    /// Delay before re-routing a message every candidate declined.
    pub busy_retry_delay: Duration,
    /// Back-off before the single spawn retry.
    pub spawn_retry_backoff: Duration,
    /// Optional age after which unacked pending entries are dropped.
    pub pending_ttl: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_bin: PathBuf::from("overseer-worker"),
            workers: WorkerType::ALL
                .into_iter()
                .map(|ty| WorkerSpec::with_defaults(ty, 1))
                .collect(),
            watchdog_poll: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(30),
            busy_retry_delay: Duration::from_secs(5),
            spawn_retry_backoff: Duration::from_millis(500),
            pending_ttl: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config {
            worker_bin: std::env::var("OVERSEER_WORKER_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("overseer-worker")),
            ..Config::default()
        };

        for spec in &mut config.workers {
            let var = count_var(spec.worker_type);
            if let Ok(raw) = std::env::var(var) {
                let count: usize = raw.parse().map_err(|_| ConfigError::InvalidCount(var))?;
                if count < 1 {
                    return Err(ConfigError::InvalidCount(var));
                }
                spec.count = count;
            }
        }

        if let Some(secs) = parse_secs("OVERSEER_WATCHDOG_POLL_SECS")? {
            config.watchdog_poll = secs;
        }
        if let Some(secs) = parse_secs("OVERSEER_HEARTBEAT_TIMEOUT_SECS")? {
            config.heartbeat_timeout = secs;
        }
        if let Some(secs) = parse_secs("OVERSEER_BUSY_RETRY_SECS")? {
            config.busy_retry_delay = secs;
        }
        config.pending_ttl = parse_secs("OVERSEER_PENDING_TTL_SECS")?;

        Ok(config)
    }

    /// Declared descriptor for a worker type, if present.
    pub fn spec_for(&self, worker_type: WorkerType) -> Option<&WorkerSpec> {
        self.workers.iter().find(|s| s.worker_type == worker_type)
    }

    /// Child environment for a worker type: the declared config map, or the
    /// reference defaults when the type has no descriptor.
    pub fn config_for(&self, worker_type: WorkerType) -> BTreeMap<String, String> {
        self.spec_for(worker_type)
            .map(|s| s.config.clone())
            .unwrap_or_else(|| default_config(worker_type))
    }
}

fn count_var(worker_type: WorkerType) -> &'static str {
    match worker_type {
        WorkerType::Database => "OVERSEER_DATABASE_WORKERS",
        WorkerType::Http => "OVERSEER_HTTP_WORKERS",
        WorkerType::Queue => "OVERSEER_QUEUE_WORKERS",
        WorkerType::Graphql => "OVERSEER_GRAPHQL_WORKERS",
    }
}

fn parse_secs(var: &'static str) -> Result<Option<Duration>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidDuration(var))?;
            Ok(Some(Duration::from_secs(secs)))
        }
        Err(_) => Ok(None),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A worker-count variable is not a positive integer.
    #[error("Invalid worker count in {0}")]
    InvalidCount(&'static str),
    /// A duration variable is not an integer number of seconds.
    #[error("Invalid duration in {0}")]
    InvalidDuration(&'static str),
}
