// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Duplex parent<->child channel endpoints.
//!
//! The supervisor creates a Unix stream socketpair per child. One end stays
//! in the parent; the other is inherited by the child at [`CHANNEL_FD`],
//! next to the three standard streams, and rediscovered through
//! [`CHANNEL_FD_ENV`]. Both ends exchange envelopes as frames.
//!
//! [`memory_pair`] gives an in-process loopback with identical semantics
//! for tests.

use std::os::fd::OwnedFd;
use std::os::unix::io::{FromRawFd, RawFd};

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::UnixStream;

use crate::envelope::Envelope;
use crate::error::{ProtocolError, Result};
use crate::frame::{read_frame, write_frame};

/// Environment variable naming the inherited channel descriptor.
pub const CHANNEL_FD_ENV: &str = "OVERSEER_CHANNEL_FD";

/// Environment variable carrying the worker type into the child.
pub const WORKER_TYPE_ENV: &str = "OVERSEER_WORKER_TYPE";

/// Descriptor the child end of the channel is inherited at.
pub const CHANNEL_FD: RawFd = 3;

/// One end of a duplex envelope channel.
pub struct Channel<S> {
    stream: S,
}

/// Channel over a Unix stream socket (the real parent/child transport).
pub type UnixChannel = Channel<UnixStream>;

/// Channel over an in-process pipe, for tests.
pub type MemoryChannel = Channel<tokio::io::DuplexStream>;

impl<S> Channel<S> {
    /// Wrap an already-connected stream.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Channel<S> {
    /// Send one envelope.
    pub async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        write_frame(&mut self.stream, envelope).await
    }

    /// Receive the next envelope.
    pub async fn recv(&mut self) -> Result<Envelope> {
        read_frame(&mut self.stream).await
    }

    /// Split into independently owned read and write halves so receive and
    /// send loops can run as separate tasks.
    pub fn split(self) -> (ChannelReader<S>, ChannelWriter<S>) {
        let (read, write) = tokio::io::split(self.stream);
        (ChannelReader { inner: read }, ChannelWriter { inner: write })
    }
}

/// Receiving half of a split channel.
pub struct ChannelReader<S> {
    inner: ReadHalf<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ChannelReader<S> {
    /// Receive the next envelope.
    pub async fn recv(&mut self) -> Result<Envelope> {
        read_frame(&mut self.inner).await
    }
}

/// Sending half of a split channel.
pub struct ChannelWriter<S> {
    inner: WriteHalf<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ChannelWriter<S> {
    /// Send one envelope.
    pub async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        write_frame(&mut self.inner, envelope).await
    }
}

/// Create the parent end of a channel plus the descriptor destined for the
/// child.
///
/// The returned [`OwnedFd`] must stay open until after the child process is
/// spawned; the spawn path dups it onto [`CHANNEL_FD`] in the child.
pub fn socket_pair() -> Result<(UnixChannel, OwnedFd)> {
    let (parent, child) = std::os::unix::net::UnixStream::pair()?;
    parent.set_nonblocking(true)?;
    let parent = UnixStream::from_std(parent)?;
    Ok((Channel::new(parent), OwnedFd::from(child)))
}

/// In-process loopback pair with the same framing as the real channel.
pub fn memory_pair() -> (MemoryChannel, MemoryChannel) {
    let (a, b) = tokio::io::duplex(crate::frame::MAX_FRAME_SIZE);
    (Channel::new(a), Channel::new(b))
}

/// Child-side constructor: adopt the channel descriptor inherited from the
/// supervisor.
///
/// The descriptor is taken from [`CHANNEL_FD_ENV`], falling back to
/// [`CHANNEL_FD`]. Calling this more than once in a process would double-
/// close the descriptor; workers call it exactly once at startup.
pub fn inherited_channel() -> Result<UnixChannel> {
    let fd: RawFd = match std::env::var(CHANNEL_FD_ENV) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ProtocolError::ChannelFdMissing(format!("unparseable {CHANNEL_FD_ENV}={raw}")))?,
        Err(_) => CHANNEL_FD,
    };

    // SAFETY: the supervisor dup'ed the socket onto this descriptor before
    // exec and nothing else in the worker owns it.
    let stream = unsafe { std::os::unix::net::UnixStream::from_raw_fd(fd) };
    stream.set_nonblocking(true).map_err(|e| {
        ProtocolError::ChannelFdMissing(format!("descriptor {fd} is not a socket: {e}"))
    })?;
    let stream = UnixStream::from_std(stream)?;
    Ok(Channel::new(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Status;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_pair_duplex() {
        let (mut parent, mut child) = memory_pair();

        let request = Envelope::new(
            Status::Completed,
            vec!["DatabaseWorker/getData".to_string()],
            json!(null),
        );
        parent.send(&request).await.unwrap();
        let received = child.recv().await.unwrap();
        assert_eq!(received, request);

        let reply = received.reply(
            Status::Completed,
            vec!["supervisor".to_string()],
            json!([{"_id": "p-1"}]),
        );
        child.send(&reply).await.unwrap();
        assert_eq!(parent.recv().await.unwrap(), reply);
    }

    #[tokio::test]
    async fn test_split_halves_run_independently() {
        let (parent, mut child) = memory_pair();
        let (mut reader, mut writer) = parent.split();

        let beat = Envelope::healthy("HttpWorker-1");
        writer.send(&beat).await.unwrap();
        assert_eq!(child.recv().await.unwrap(), beat);

        child.send(&Envelope::ack("m-9")).await.unwrap();
        assert_eq!(reader.recv().await.unwrap().message_id, "m-9");
    }

    #[tokio::test]
    async fn test_socket_pair_transports_frames() {
        let (mut parent, child_fd) = socket_pair().unwrap();

        let raw = std::os::unix::net::UnixStream::from(child_fd);
        raw.set_nonblocking(true).unwrap();
        let mut child = Channel::new(UnixStream::from_std(raw).unwrap());

        let env = Envelope::ack("m-10");
        parent.send(&env).await.unwrap();
        assert_eq!(child.recv().await.unwrap(), env);
    }

    #[tokio::test]
    async fn test_dropped_peer_closes_channel() {
        let (parent, child) = memory_pair();
        drop(parent);

        let (mut reader, _writer) = child.split();
        let err = reader.recv().await.unwrap_err();
        assert!(matches!(err, ProtocolError::ChannelClosed));
    }
}
