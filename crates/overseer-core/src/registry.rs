// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker registry.
//!
//! In-memory set of live children, owned exclusively by the supervisor
//! task. Insertion order is preserved: "first alive worker of a type"
//! means first registered, which keeps forwarding deterministic.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use overseer_protocol::{Envelope, WorkerType};

/// Handle to a launched child, created by the launcher.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    /// OS pid (or a synthetic pid for mock launchers).
    pub pid: u32,
    /// Declared type the child runs as.
    pub worker_type: WorkerType,
    /// When the child was spawned.
    pub spawned_at: DateTime<Utc>,
    /// Outbound channel to the child's writer task.
    pub sender: mpsc::UnboundedSender<Envelope>,
}

impl WorkerHandle {
    /// Queue an envelope for delivery to the child.
    ///
    /// Queuing succeeds as long as the writer task is alive; actual
    /// delivery can still fail and is logged by the writer.
    pub fn send(&self, envelope: Envelope) -> Result<(), mpsc::error::SendError<Envelope>> {
        self.sender.send(envelope)
    }
}

/// Registry entry: the handle plus the exit/kill bookkeeping the liveness
/// check reads.
#[derive(Debug)]
pub struct WorkerRecord {
    /// Launcher handle.
    pub handle: WorkerHandle,
    /// Exit code once the child has exited.
    pub exit_code: Option<i32>,
    /// True once the supervisor delivered a kill signal.
    pub killed: bool,
    /// Last heartbeat (or registration) time.
    pub last_seen: Instant,
}

impl WorkerRecord {
    /// New record for a freshly launched child.
    pub fn new(handle: WorkerHandle) -> Self {
        Self {
            handle,
            exit_code: None,
            killed: false,
            last_seen: Instant::now(),
        }
    }

    /// Liveness per the contract: not exited and not killed. Advisory -
    /// a send can still fail after this returns true.
    pub fn is_alive(&self) -> bool {
        self.exit_code.is_none() && !self.killed
    }
}

/// The set of live children.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: Vec<WorkerRecord>,
}

impl WorkerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a child. Keeps insertion order.
    pub fn insert(&mut self, record: WorkerRecord) {
        self.workers.push(record);
    }

    /// Remove a child by pid, returning its record.
    pub fn remove(&mut self, pid: u32) -> Option<WorkerRecord> {
        let idx = self.workers.iter().position(|w| w.handle.pid == pid)?;
        Some(self.workers.remove(idx))
    }

    /// Look up a child by pid.
    pub fn get(&self, pid: u32) -> Option<&WorkerRecord> {
        self.workers.iter().find(|w| w.handle.pid == pid)
    }

    /// Mutable lookup by pid.
    pub fn get_mut(&mut self, pid: u32) -> Option<&mut WorkerRecord> {
        self.workers.iter_mut().find(|w| w.handle.pid == pid)
    }

    /// Children of a type, insertion order.
    pub fn of_type(&self, worker_type: WorkerType) -> impl Iterator<Item = &WorkerRecord> {
        self.workers
            .iter()
            .filter(move |w| w.handle.worker_type == worker_type)
    }

    /// Alive children of a type, insertion order.
    pub fn alive_of_type(&self, worker_type: WorkerType) -> impl Iterator<Item = &WorkerRecord> {
        self.of_type(worker_type).filter(|w| w.is_alive())
    }

    /// First alive child of a type.
    pub fn first_alive(&self, worker_type: WorkerType) -> Option<&WorkerRecord> {
        self.alive_of_type(worker_type).next()
    }

    /// Record a heartbeat for a pid. Returns false when the pid is unknown.
    pub fn record_heartbeat(&mut self, pid: u32) -> bool {
        match self.get_mut(pid) {
            Some(record) => {
                record.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// All records, insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &WorkerRecord> {
        self.workers.iter()
    }

    /// Number of registered children.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// True when no children are registered.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Registered instance counts per type, for startup logging.
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.workers {
            *counts.entry(record.handle.worker_type.wire_name()).or_insert(0) += 1;
        }
        counts
    }
}
