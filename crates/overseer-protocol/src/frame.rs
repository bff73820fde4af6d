// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire framing for the duplex channel.
//!
//! Each message is one frame:
//! - 4 bytes: payload length (big-endian)
//! - N bytes: JSON-encoded envelope
//!
//! The substrate (a stream socket) guarantees ordered delivery; the length
//! prefix restores message boundaries on top of it.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::envelope::Envelope;
use crate::error::{ProtocolError, Result};

/// Maximum frame payload size (1 MiB). Envelopes are small control
/// records; anything bigger is a corrupt length prefix.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Frame header size (4-byte length prefix).
pub const HEADER_SIZE: usize = 4;

/// Write one envelope as a frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, envelope: &Envelope) -> Result<()> {
    let payload = serde_json::to_vec(envelope)?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(&payload);

    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one envelope frame.
///
/// A clean EOF at a frame boundary is [`ProtocolError::ChannelClosed`];
/// EOF inside a frame is an I/O error.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Envelope> {
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ChannelClosed);
        }
        Err(e) => return Err(e.into()),
    }

    let length = u32::from_be_bytes(header) as usize;
    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(length));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;

    Ok(serde_json::from_slice(&payload)?)
}
