// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for overseer-sdk.

use thiserror::Error;

/// Worker-side errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SdkError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// An environment variable has an unusable value.
    #[error("Invalid value in {variable}: {value}")]
    InvalidEnvVar {
        /// Variable name.
        variable: &'static str,
        /// The offending value.
        value: String,
    },

    /// Protocol-level failure (framing, grammar, channel).
    #[error("Protocol error: {0}")]
    Protocol(#[from] overseer_protocol::ProtocolError),

    /// A handler task panicked; the worker must exit and be restarted.
    #[error("Handler panicked: {0}")]
    HandlerPanic(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type using [`SdkError`].
pub type Result<T> = std::result::Result<T, SdkError>;
