// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Events feeding the supervisor's single consumer queue.
//!
//! Every per-child task (frame reader, exit watcher) and every deferred
//! timer funnels into this queue, so all registry and pending-table
//! mutation happens on one task and needs no locks.

use tokio::sync::mpsc;

use overseer_protocol::{Envelope, WorkerType};

/// One unit of work for the supervisor loop.
#[derive(Debug)]
pub enum SupervisorEvent {
    /// An envelope arrived from a child, tagged with the source pid.
    Inbound {
        /// Pid of the child the envelope came from.
        pid: u32,
        /// The envelope.
        envelope: Envelope,
    },
    /// A child exited (or was killed).
    Exited {
        /// Pid of the child.
        pid: u32,
        /// Type the child was registered as.
        worker_type: WorkerType,
        /// Exit code when the child exited normally.
        exit_code: Option<i32>,
    },
    /// A deferred re-route is due (all candidates were busy earlier).
    Retry {
        /// Worker type the envelope targets.
        worker_type: WorkerType,
        /// The original envelope.
        envelope: Envelope,
    },
}

/// Sender half of the supervisor queue; cloned into every per-child task.
pub type EventSender = mpsc::UnboundedSender<SupervisorEvent>;

/// Receiver half, owned by the supervisor loop.
pub type EventReceiver = mpsc::UnboundedReceiver<SupervisorEvent>;

/// Create the supervisor queue.
pub fn event_queue() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
