// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Real process launcher.
//!
//! Each child inherits the three standard streams and the duplex channel
//! socket at fd 3. Three tasks are installed per child: a reader pumping
//! inbound envelopes into the supervisor queue, a writer draining the
//! outbound channel, and an exit watcher reporting the child's fate.

use std::collections::BTreeMap;
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use chrono::Utc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use overseer_protocol::{
    CHANNEL_FD, CHANNEL_FD_ENV, ProtocolError, WORKER_TYPE_ENV, WorkerType, socket_pair,
};

use crate::error::{CoreError, Result};
use crate::event::{EventSender, SupervisorEvent};
use crate::registry::WorkerHandle;
use crate::spawn::Launcher;

/// Launcher forking real worker processes.
pub struct ProcessLauncher {
    worker_bin: PathBuf,
}

impl ProcessLauncher {
    /// Launcher spawning `worker_bin` for every worker type.
    pub fn new(worker_bin: PathBuf) -> Self {
        Self { worker_bin }
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(
        &self,
        worker_type: WorkerType,
        config: &BTreeMap<String, String>,
        events: EventSender,
    ) -> Result<WorkerHandle> {
        let (channel, child_fd) = socket_pair()?;

        let mut cmd = Command::new(&self.worker_bin);
        cmd.env(WORKER_TYPE_ENV, worker_type.wire_name())
            .env(CHANNEL_FD_ENV, CHANNEL_FD.to_string())
            .envs(config.iter())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let raw_fd = child_fd.as_raw_fd();
        // SAFETY: only async-signal-safe calls between fork and exec.
        unsafe {
            cmd.pre_exec(move || {
                // dup2 onto the well-known descriptor clears CLOEXEC; when
                // the socket already sits there, clear the flag directly.
                let rc = if raw_fd == CHANNEL_FD {
                    libc::fcntl(CHANNEL_FD, libc::F_SETFD, 0)
                } else {
                    libc::dup2(raw_fd, CHANNEL_FD)
                };
                if rc == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(|e| CoreError::Spawn {
            worker_type,
            reason: e.to_string(),
        })?;
        drop(child_fd);

        let pid = child.id().ok_or_else(|| CoreError::Spawn {
            worker_type,
            reason: "child exited before a pid was assigned".to_string(),
        })?;

        info!(
            pid = pid,
            worker_type = %worker_type,
            bin = %self.worker_bin.display(),
            "Worker process spawned"
        );

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let (mut reader, mut writer) = channel.split();

        // Inbound pump: every frame becomes a supervisor event.
        let reader_events = events.clone();
        tokio::spawn(async move {
            loop {
                match reader.recv().await {
                    Ok(envelope) => {
                        if reader_events
                            .send(SupervisorEvent::Inbound { pid, envelope })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(ProtocolError::ChannelClosed) => {
                        debug!(pid = pid, "Worker channel closed");
                        break;
                    }
                    Err(e) => {
                        error!(pid = pid, error = %e, "Worker channel read failed");
                        break;
                    }
                }
            }
        });

        // Outbound drain: one writer task per child keeps sends ordered
        // without blocking the supervisor loop.
        tokio::spawn(async move {
            while let Some(envelope) = outbound_rx.recv().await {
                if let Err(e) = writer.send(&envelope).await {
                    error!(
                        pid = pid,
                        message_id = %envelope.message_id,
                        error = %e,
                        "Failed to deliver envelope to worker"
                    );
                    break;
                }
            }
        });

        // Exit watcher owns the child.
        tokio::spawn(async move {
            let exit_code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(pid = pid, error = %e, "Waiting on worker failed");
                    None
                }
            };
            let _ = events.send(SupervisorEvent::Exited {
                pid,
                worker_type,
                exit_code,
            });
        });

        Ok(WorkerHandle {
            pid,
            worker_type,
            spawned_at: Utc::now(),
            sender: outbound_tx,
        })
    }

    async fn stop(&self, handle: &WorkerHandle) -> Result<()> {
        match signal::kill(Pid::from_raw(handle.pid as i32), Signal::SIGKILL) {
            Ok(()) => {
                debug!(pid = handle.pid, "Sent SIGKILL to worker");
                Ok(())
            }
            Err(nix::errno::Errno::ESRCH) => {
                debug!(pid = handle.pid, "Worker already dead (ESRCH)");
                Ok(())
            }
            Err(e) => Err(CoreError::Other(format!(
                "failed to kill pid {}: {e}",
                handle.pid
            ))),
        }
    }
}
