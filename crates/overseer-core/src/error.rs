// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for overseer-core.

use thiserror::Error;

use overseer_protocol::WorkerType;

/// Supervisor errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Protocol-level failure (framing, grammar, channel).
    #[error("Protocol error: {0}")]
    Protocol(#[from] overseer_protocol::ProtocolError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A caller passed an argument outside the contract.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Launching a child process failed.
    #[error("Spawn failed for {worker_type}: {reason}")]
    Spawn {
        /// Worker type that failed to launch.
        worker_type: WorkerType,
        /// Underlying failure.
        reason: String,
    },

    /// No registry entry for the given pid.
    #[error("Worker not found: pid {0}")]
    WorkerNotFound(u32),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;
