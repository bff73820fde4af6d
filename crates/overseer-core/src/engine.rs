// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Spawn/restart engine.
//!
//! Thin lifecycle layer between the supervisor loop and the launcher:
//! create worker slots (with one retry per slot), kill workers for
//! restart, and replay the pending table to a replacement. Replacement
//! itself is driven by the exit event, so a router-initiated restart and
//! an unexpected crash take exactly the same path.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{error, info, warn};

use overseer_protocol::{Envelope, SUPERVISOR_TARGET, Status, WorkerType};

use crate::error::{CoreError, Result};
use crate::event::EventSender;
use crate::pending::PendingTable;
use crate::registry::{WorkerRecord, WorkerRegistry};
use crate::spawn::Launcher;

/// Launch, restart, and drain orchestration.
pub struct SpawnEngine {
    launcher: Arc<dyn Launcher>,
    events: EventSender,
    spawn_retry_backoff: Duration,
}

impl SpawnEngine {
    /// New engine over a launcher.
    pub fn new(launcher: Arc<dyn Launcher>, events: EventSender, spawn_retry_backoff: Duration) -> Self {
        Self {
            launcher,
            events,
            spawn_retry_backoff,
        }
    }

    /// Launch `count` workers of `worker_type` and register them.
    ///
    /// Each slot gets one retry after a short back-off. A slot that still
    /// fails is surfaced as an `error` envelope in the log and left empty;
    /// the other slots are unaffected.
    pub async fn create_worker(
        &self,
        registry: &mut WorkerRegistry,
        worker_type: WorkerType,
        count: usize,
        config: &BTreeMap<String, String>,
    ) -> Result<()> {
        if count < 1 {
            return Err(CoreError::InvalidArgument(format!(
                "worker count must be >= 1, got {count}"
            )));
        }

        for _ in 0..count {
            match self.launch_with_retry(worker_type, config).await {
                Ok(handle) => {
                    info!(pid = handle.pid, worker_type = %worker_type, "Worker registered");
                    registry.insert(WorkerRecord::new(handle));
                }
                Err(e) => {
                    let notice = Envelope::new(
                        Status::Error,
                        vec![SUPERVISOR_TARGET.to_string()],
                        json!({
                            "workerType": worker_type.wire_name(),
                            "error": e.to_string(),
                        }),
                    )
                    .with_reason("SPAWN_FAILED");
                    error!(
                        worker_type = %worker_type,
                        error = %e,
                        envelope = %serde_json::to_string(&notice).unwrap_or_default(),
                        "Giving up on worker slot after retry"
                    );
                }
            }
        }
        Ok(())
    }

    async fn launch_with_retry(
        &self,
        worker_type: WorkerType,
        config: &BTreeMap<String, String>,
    ) -> Result<crate::registry::WorkerHandle> {
        match self
            .launcher
            .launch(worker_type, config, self.events.clone())
            .await
        {
            Ok(handle) => Ok(handle),
            Err(first) => {
                warn!(
                    worker_type = %worker_type,
                    error = %first,
                    backoff_ms = self.spawn_retry_backoff.as_millis() as u64,
                    "Worker launch failed, retrying once"
                );
                tokio::time::sleep(self.spawn_retry_backoff).await;
                self.launcher
                    .launch(worker_type, config, self.events.clone())
                    .await
            }
        }
    }

    /// Kill a worker so the exit path replaces it.
    ///
    /// Marks the record killed first - the worker must not be selected as
    /// a forwarding target between the kill and the exit event.
    pub async fn restart_worker(&self, registry: &mut WorkerRegistry, pid: u32) -> Result<()> {
        let record = registry
            .get_mut(pid)
            .ok_or(CoreError::WorkerNotFound(pid))?;
        record.killed = true;
        let handle = record.handle.clone();

        warn!(pid = pid, worker_type = %handle.worker_type, "Restarting worker");
        self.launcher.stop(&handle).await
    }

    /// Replay the pending list of a type to its first alive worker.
    ///
    /// Entries are not removed here - completion acks drive removal. With
    /// no alive worker the entries simply stay tracked.
    pub fn drain_pending(
        &self,
        registry: &WorkerRegistry,
        pending: &PendingTable,
        worker_type: WorkerType,
    ) {
        let Some(record) = registry.first_alive(worker_type) else {
            info!(worker_type = %worker_type, "No alive worker to drain pending messages to");
            return;
        };

        let snapshot = pending.drain(worker_type);
        if snapshot.is_empty() {
            return;
        }

        info!(
            worker_type = %worker_type,
            pid = record.handle.pid,
            count = snapshot.len(),
            "Draining pending messages"
        );
        for envelope in snapshot {
            let message_id = envelope.message_id.clone();
            match record.handle.send(envelope) {
                Ok(()) => info!(
                    message_id = %message_id,
                    pid = record.handle.pid,
                    "Replayed pending message"
                ),
                Err(e) => error!(
                    message_id = %message_id,
                    pid = record.handle.pid,
                    error = %e,
                    "Failed to replay pending message"
                ),
            }
        }
    }
}
