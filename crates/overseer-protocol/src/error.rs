// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for overseer-protocol.

use thiserror::Error;

use crate::frame::MAX_FRAME_SIZE;

/// Protocol errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// A destination named a worker type that is not declared.
    #[error("Unknown worker type: {0}")]
    UnknownWorkerType(String),

    /// A destination string does not match the grammar.
    #[error("Malformed destination: {0:?}")]
    MalformedDestination(String),

    /// An envelope violated a structural invariant.
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(&'static str),

    /// A frame payload exceeded the size limit.
    #[error("frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    /// The peer closed the channel.
    #[error("channel closed")]
    ChannelClosed,

    /// The channel descriptor the child expects was not inherited.
    #[error("channel descriptor missing: {0}")]
    ChannelFdMissing(String),

    /// I/O error on the channel.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Envelope JSON encode/decode failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type using [`ProtocolError`].
pub type Result<T> = std::result::Result<T, ProtocolError>;
