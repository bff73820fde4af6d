// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock launcher for testing.
//!
//! Simulates worker children without forking processes: each launch hands
//! back a synthetic pid, the envelopes the supervisor forwards land in a
//! per-worker inbox, and tests script worker behavior by emitting inbound
//! envelopes and exits through the same event queue real children use.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, mpsc};

use overseer_protocol::{Envelope, WorkerType};

use crate::error::{CoreError, Result};
use crate::event::{EventSender, SupervisorEvent};
use crate::registry::WorkerHandle;
use crate::spawn::Launcher;

/// A simulated worker child.
pub struct MockWorker {
    /// Type the worker was launched as.
    pub worker_type: WorkerType,
    /// Environment the launch was given.
    pub config: BTreeMap<String, String>,
    /// Envelopes forwarded by the supervisor, until taken by the test.
    pub inbox: Option<mpsc::UnboundedReceiver<Envelope>>,
    /// Event queue of the launching supervisor.
    pub events: EventSender,
    /// True after `stop` (or a scripted exit).
    pub stopped: bool,
}

#[derive(Default)]
struct MockState {
    workers: HashMap<u32, MockWorker>,
    order: Vec<(u32, WorkerType)>,
}

/// Mock launcher for testing.
pub struct MockLauncher {
    next_pid: AtomicU32,
    fail_launches: AtomicUsize,
    state: Mutex<MockState>,
}

impl Default for MockLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLauncher {
    /// Create a new mock launcher. Synthetic pids start at 1000.
    pub fn new() -> Self {
        Self {
            next_pid: AtomicU32::new(1000),
            fail_launches: AtomicUsize::new(0),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Make the next `n` launches fail.
    pub fn fail_next(&self, n: usize) {
        self.fail_launches.store(n, Ordering::SeqCst);
    }

    /// Take the inbox of a launched worker for inspection.
    pub async fn take_inbox(&self, pid: u32) -> Option<mpsc::UnboundedReceiver<Envelope>> {
        self.state
            .lock()
            .await
            .workers
            .get_mut(&pid)
            .and_then(|w| w.inbox.take())
    }

    /// Emit an envelope as if the worker had sent it.
    pub async fn emit(&self, pid: u32, envelope: Envelope) -> bool {
        let state = self.state.lock().await;
        match state.workers.get(&pid) {
            Some(worker) => worker
                .events
                .send(SupervisorEvent::Inbound { pid, envelope })
                .is_ok(),
            None => false,
        }
    }

    /// Script an exit for a launched worker.
    pub async fn exit(&self, pid: u32, exit_code: Option<i32>) -> bool {
        let mut state = self.state.lock().await;
        match state.workers.get_mut(&pid) {
            Some(worker) => {
                worker.stopped = true;
                let worker_type = worker.worker_type;
                worker
                    .events
                    .send(SupervisorEvent::Exited {
                        pid,
                        worker_type,
                        exit_code,
                    })
                    .is_ok()
            }
            None => false,
        }
    }

    /// Every launch so far, in order.
    pub async fn launches(&self) -> Vec<(u32, WorkerType)> {
        self.state.lock().await.order.clone()
    }

    /// Number of launches so far.
    pub async fn launch_count(&self) -> usize {
        self.state.lock().await.order.len()
    }

    /// Pids launched for a type, in order.
    pub async fn pids_of_type(&self, worker_type: WorkerType) -> Vec<u32> {
        self.state
            .lock()
            .await
            .order
            .iter()
            .filter(|(_, ty)| *ty == worker_type)
            .map(|(pid, _)| *pid)
            .collect()
    }

    /// True when `stop` was called (or an exit was scripted) for the pid.
    pub async fn is_stopped(&self, pid: u32) -> bool {
        self.state
            .lock()
            .await
            .workers
            .get(&pid)
            .is_some_and(|w| w.stopped)
    }

    /// The environment a worker was launched with.
    pub async fn config_of(&self, pid: u32) -> Option<BTreeMap<String, String>> {
        self.state
            .lock()
            .await
            .workers
            .get(&pid)
            .map(|w| w.config.clone())
    }
}

#[async_trait]
impl Launcher for MockLauncher {
    async fn launch(
        &self,
        worker_type: WorkerType,
        config: &BTreeMap<String, String>,
        events: EventSender,
    ) -> Result<WorkerHandle> {
        let remaining = self.fail_launches.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_launches.store(remaining - 1, Ordering::SeqCst);
            return Err(CoreError::Spawn {
                worker_type,
                reason: "mock launch failure".to_string(),
            });
        }

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let mut state = self.state.lock().await;
        state.workers.insert(
            pid,
            MockWorker {
                worker_type,
                config: config.clone(),
                inbox: Some(outbound_rx),
                events,
                stopped: false,
            },
        );
        state.order.push((pid, worker_type));

        Ok(WorkerHandle {
            pid,
            worker_type,
            spawned_at: Utc::now(),
            sender: outbound_tx,
        })
    }

    async fn stop(&self, handle: &WorkerHandle) -> Result<()> {
        // A kill is always followed by an exit report, like a real child.
        self.exit(handle.pid, None).await;
        Ok(())
    }
}
