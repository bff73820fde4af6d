// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The worker runtime.
//!
//! Implements the contract every worker process must satisfy: a stable
//! instance id, a heartbeat every 10 seconds, destination filtering by own
//! type, method dispatch through the handler table, and `SERVER_BUSY`
//! back-pressure while a task is in flight. The worker is single-task by
//! contract; the supervisor re-homes anything it declines.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use overseer_protocol::{
    Channel, ChannelWriter, Destination, Envelope, ProtocolError, SUPERVISOR_TARGET, Status,
    Target, WorkerType,
};

use crate::config::DEFAULT_HEARTBEAT_INTERVAL;
use crate::error::{Result, SdkError};
use crate::handlers::{HandlerTable, REASON_UNKNOWN_METHOD, Reply};

/// One worker process's runtime loop.
pub struct WorkerRuntime {
    worker_type: WorkerType,
    instance_id: String,
    handlers: HandlerTable,
    heartbeat_interval: Duration,
}

impl WorkerRuntime {
    /// Runtime for a worker type with its handler table. Generates the
    /// stable `<TypeName>-<uuid>` instance id.
    pub fn new(worker_type: WorkerType, handlers: HandlerTable) -> Self {
        let instance_id = format!("{}-{}", worker_type.wire_name(), Uuid::new_v4());
        Self {
            worker_type,
            instance_id,
            handlers,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    /// Override the heartbeat cadence.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// The instance id included in every heartbeat.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Serve the channel until the supervisor closes it.
    ///
    /// Returns `Ok(())` on a clean channel close. A handler panic emits an
    /// `error` envelope and returns the error so the process exits and the
    /// supervisor restarts it.
    pub async fn run<S>(self, channel: Channel<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        info!(
            instance_id = %self.instance_id,
            worker_type = %self.worker_type,
            methods = ?self.handlers.methods(),
            "Worker runtime started"
        );

        let (mut reader, mut writer) = channel.split();

        let mut beat = tokio::time::interval(self.heartbeat_interval);
        beat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // At most one in-flight task; its presence is the busy flag.
        let mut in_flight: JoinSet<(String, Vec<Reply>)> = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = beat.tick() => {
                    writer.send(&Envelope::healthy(&self.instance_id)).await?;
                    debug!(instance_id = %self.instance_id, "Heartbeat sent");
                }

                Some(finished) = in_flight.join_next() => {
                    match finished {
                        Ok((message_id, replies)) => {
                            for reply in replies {
                                let envelope = self.reply_envelope(&message_id, reply);
                                writer.send(&envelope).await?;
                                info!(
                                    message_id = %message_id,
                                    status = envelope.status.as_str(),
                                    "Reply sent"
                                );
                            }
                        }
                        Err(join_error) => {
                            let notice = Envelope::new(
                                Status::Error,
                                vec![SUPERVISOR_TARGET.to_string()],
                                serde_json::Value::Null,
                            )
                            .with_reason(join_error.to_string());
                            let _ = writer.send(&notice).await;
                            error!(error = %join_error, "Handler panicked, exiting");
                            return Err(SdkError::HandlerPanic(join_error.to_string()));
                        }
                    }
                }

                inbound = reader.recv() => {
                    match inbound {
                        Ok(envelope) => {
                            self.handle_inbound(envelope, &mut in_flight, &mut writer).await?;
                        }
                        Err(ProtocolError::ChannelClosed) => {
                            info!(instance_id = %self.instance_id, "Supervisor channel closed");
                            return Ok(());
                        }
                        Err(e) => {
                            error!(error = %e, "Channel read failed, exiting");
                            return Err(e.into());
                        }
                    }
                }
            }
        }
    }

    async fn handle_inbound<S>(
        &self,
        envelope: Envelope,
        in_flight: &mut JoinSet<(String, Vec<Reply>)>,
        writer: &mut ChannelWriter<S>,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        // Only destinations naming this worker's type are ours.
        let mine: Vec<Destination> = envelope
            .destination
            .iter()
            .filter_map(|raw| Destination::parse(raw).ok())
            .filter(|d| d.target == Target::Worker(self.worker_type))
            .collect();

        if mine.is_empty() {
            debug!(
                message_id = %envelope.message_id,
                "Envelope not addressed to this worker, ignoring"
            );
            return Ok(());
        }

        if !in_flight.is_empty() {
            warn!(
                message_id = %envelope.message_id,
                "Busy with a previous task, declining"
            );
            writer.send(&Envelope::busy(envelope.message_id.as_str())).await?;
            return Ok(());
        }

        let mut jobs = Vec::new();
        for dest in mine {
            let method = dest.method.as_deref().unwrap_or_default();
            match self.handlers.dispatch(method, dest.arg.clone(), envelope.clone()) {
                Some(job) => jobs.push(job),
                None => {
                    warn!(
                        message_id = %envelope.message_id,
                        method = method,
                        "Unknown method requested"
                    );
                    let reply = self.reply_envelope(
                        &envelope.message_id,
                        Reply::failed(REASON_UNKNOWN_METHOD),
                    );
                    writer.send(&reply).await?;
                }
            }
        }

        if jobs.is_empty() {
            return Ok(());
        }

        let message_id = envelope.message_id.clone();
        in_flight.spawn(async move {
            let mut replies = Vec::with_capacity(jobs.len());
            for job in jobs {
                replies.push(job.await);
            }
            (message_id, replies)
        });
        Ok(())
    }

    /// Build the reply envelope for a handler's [`Reply`].
    ///
    /// A completion always carries the supervisor among its destinations
    /// so the pending entry is acknowledged even when the reply fans out
    /// to peers.
    fn reply_envelope(&self, message_id: &str, reply: Reply) -> Envelope {
        let mut destination = reply.destination;
        if destination.is_empty() {
            destination.push(SUPERVISOR_TARGET.to_string());
        } else if reply.status == Status::Completed
            && !destination
                .iter()
                .any(|d| Destination::routing_key(d) == SUPERVISOR_TARGET)
        {
            destination.push(SUPERVISOR_TARGET.to_string());
        }

        Envelope {
            message_id: message_id.to_string(),
            status: reply.status,
            reason: reply.reason,
            destination,
            data: reply.data,
        }
    }
}
