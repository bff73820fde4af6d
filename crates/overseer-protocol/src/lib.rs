// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Overseer protocol - wire format shared by the supervisor and its workers.
//!
//! Every parent<->child exchange is a single [`Envelope`] carried as a
//! length-prefixed JSON frame over the duplex channel the supervisor opens
//! alongside the child's standard streams. This crate owns:
//!
//! - the envelope record and its `status` vocabulary ([`envelope`])
//! - the destination grammar `WorkerType[/method[/arg]]` ([`destination`])
//! - the frame codec ([`frame`])
//! - the channel endpoints for both sides of the fork ([`channel`])
//!
//! Higher layers never touch raw bytes: the supervisor and the worker SDK
//! both speak in envelopes.

mod channel;
mod destination;
mod envelope;
mod error;
mod frame;

pub use channel::{
    CHANNEL_FD, CHANNEL_FD_ENV, Channel, ChannelReader, ChannelWriter, MemoryChannel, UnixChannel,
    WORKER_TYPE_ENV, inherited_channel, memory_pair, socket_pair,
};
pub use destination::{Destination, Target, WorkerType};
pub use envelope::{Envelope, REASON_NO_DATA, REASON_SERVER_BUSY, SUPERVISOR_TARGET, Status};
pub use error::{ProtocolError, Result};
pub use frame::{HEADER_SIZE, MAX_FRAME_SIZE, read_frame, write_frame};
