// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pending message table.
//!
//! Per-worker-type ordered list of envelopes forwarded and not yet
//! acknowledged. This is the only state that must survive a worker
//! restart: the drain after a replacement registers replays the list in
//! insertion order. Removal is driven by completion acks, never by the
//! drain itself.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use overseer_protocol::{Envelope, WorkerType};

/// One tracked in-flight message.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    /// Envelope message id, the dedup key.
    pub message_id: String,
    /// The envelope as it was forwarded.
    pub envelope: Envelope,
    /// When the entry was first tracked.
    pub enqueued_at: Instant,
}

/// Mapping from worker type to its in-flight list.
#[derive(Default)]
pub struct PendingTable {
    entries: HashMap<WorkerType, Vec<PendingMessage>>,
}

impl PendingTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an envelope for a type.
    ///
    /// Appends iff no entry with the same `messageId` exists for the type;
    /// returns false on the duplicate.
    pub fn track(&mut self, worker_type: WorkerType, envelope: &Envelope) -> bool {
        let list = self.entries.entry(worker_type).or_default();
        if list.iter().any(|m| m.message_id == envelope.message_id) {
            return false;
        }
        list.push(PendingMessage {
            message_id: envelope.message_id.clone(),
            envelope: envelope.clone(),
            enqueued_at: Instant::now(),
        });
        true
    }

    /// Remove an entry by id. Returns false when absent; absence is not an
    /// error.
    pub fn remove(&mut self, worker_type: WorkerType, message_id: &str) -> bool {
        match self.entries.get_mut(&worker_type) {
            Some(list) => {
                let before = list.len();
                list.retain(|m| m.message_id != message_id);
                before != list.len()
            }
            None => false,
        }
    }

    /// Snapshot of the list for a type in insertion order; does not mutate.
    pub fn drain(&self, worker_type: WorkerType) -> Vec<Envelope> {
        self.entries
            .get(&worker_type)
            .map(|list| list.iter().map(|m| m.envelope.clone()).collect())
            .unwrap_or_default()
    }

    /// The tracked envelope for an id, if any.
    pub fn get(&self, worker_type: WorkerType, message_id: &str) -> Option<&Envelope> {
        self.entries
            .get(&worker_type)?
            .iter()
            .find(|m| m.message_id == message_id)
            .map(|m| &m.envelope)
    }

    /// Number of entries tracked for a type.
    pub fn len(&self, worker_type: WorkerType) -> usize {
        self.entries.get(&worker_type).map_or(0, Vec::len)
    }

    /// True when nothing is tracked for a type.
    pub fn is_empty(&self, worker_type: WorkerType) -> bool {
        self.len(worker_type) == 0
    }

    /// Drop entries older than `ttl` across all types, returning how many
    /// were dropped.
    pub fn expire_older_than(&mut self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut dropped = 0;
        for list in self.entries.values_mut() {
            let before = list.len();
            list.retain(|m| now.duration_since(m.enqueued_at) < ttl);
            dropped += before - list.len();
        }
        dropped
    }
}
