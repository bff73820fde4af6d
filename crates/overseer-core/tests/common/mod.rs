// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for supervisor integration tests.
//!
//! Runs a real supervisor loop over the mock launcher so tests can script
//! worker behavior (messages, busy replies, exits) through the same event
//! queue real children use.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use overseer_core::config::{Config, WorkerSpec};
use overseer_core::error::Result;
use overseer_core::liveness::{FixedProbe, ProcState};
use overseer_core::spawn::MockLauncher;
use overseer_core::supervisor::Supervisor;
use overseer_protocol::{Envelope, WorkerType};

/// A running supervisor over a mock fleet.
pub struct TestContext {
    pub launcher: Arc<MockLauncher>,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<Result<()>>,
}

impl TestContext {
    /// Start a supervisor with the given worker descriptors and wait until
    /// the whole declared fleet is up.
    pub async fn start(workers: Vec<WorkerSpec>) -> Self {
        Self::start_with(|config| {
            config.workers = workers;
        })
        .await
    }

    /// Start a supervisor after applying `adjust` to a test-friendly
    /// default configuration.
    pub async fn start_with(adjust: impl FnOnce(&mut Config)) -> Self {
        let mut config = Config {
            busy_retry_delay: Duration::from_millis(20),
            spawn_retry_backoff: Duration::from_millis(1),
            // long enough that only tests that shorten it see restarts
            heartbeat_timeout: Duration::from_secs(300),
            watchdog_poll: Duration::from_secs(60),
            ..Config::default()
        };
        adjust(&mut config);

        let expected: usize = config.workers.iter().map(|s| s.count).sum();
        let launcher = Arc::new(MockLauncher::new());
        // Mock pids could collide with real processes in procfs, so pin
        // the scheduler state instead of probing.
        let supervisor = Supervisor::with_probe(
            config,
            launcher.clone(),
            Box::new(FixedProbe(ProcState::Idle)),
        );
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(supervisor.run(shutdown.clone()));

        let ctx = Self {
            launcher,
            shutdown,
            handle,
        };
        ctx.wait_for_launches(expected).await;
        ctx
    }

    /// Block until at least `n` launches happened.
    pub async fn wait_for_launches(&self, n: usize) {
        wait_until(Duration::from_secs(2), || {
            let launcher = self.launcher.clone();
            async move { launcher.launch_count().await >= n }
        })
        .await;
    }

    /// Script an envelope arriving from a worker.
    pub async fn emit(&self, pid: u32, envelope: Envelope) {
        assert!(
            self.launcher.emit(pid, envelope).await,
            "emit for unknown pid {pid}"
        );
    }

    /// Pids launched so far for a type.
    pub async fn pids_of(&self, worker_type: WorkerType) -> Vec<u32> {
        self.launcher.pids_of_type(worker_type).await
    }

    /// Cancel the supervisor and wait for a clean exit.
    pub async fn stop(self) {
        self.shutdown.cancel();
        self.handle
            .await
            .expect("supervisor task panicked")
            .expect("supervisor returned an error");
    }
}

/// Minimal descriptor for a worker type with an empty config map.
pub fn spec(worker_type: WorkerType, count: usize) -> WorkerSpec {
    WorkerSpec {
        worker_type,
        count,
        config: BTreeMap::new(),
    }
}

/// Poll `predicate` until it holds or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut predicate: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not reached within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Receive the next envelope from a worker inbox, with a timeout.
pub async fn next_envelope(
    inbox: &mut tokio::sync::mpsc::UnboundedReceiver<Envelope>,
) -> Envelope {
    tokio::time::timeout(Duration::from_secs(2), inbox.recv())
        .await
        .expect("timed out waiting for envelope")
        .expect("worker inbox closed")
}
