// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Heartbeat watchdog.
//!
//! Workers beat every 10 seconds; the watchdog polls on the same cadence
//! and restarts any worker that has been silent for 30 seconds (three
//! missed beats). Exit detection catches crashed processes immediately -
//! the watchdog exists for the "alive but not runnable" case: a child
//! that still holds its process slot but stopped servicing its channel.

use std::time::Duration;

use tracing::{debug, error, warn};

use crate::engine::SpawnEngine;
use crate::pending::PendingTable;
use crate::registry::WorkerRegistry;

/// Restart every alive worker whose last heartbeat is older than
/// `heartbeat_timeout`. The kill takes the normal exit path, so the
/// replacement gets the pending drain like any other restart.
pub(crate) async fn check_worker_health(
    registry: &mut WorkerRegistry,
    engine: &SpawnEngine,
    heartbeat_timeout: Duration,
) {
    let stale: Vec<u32> = registry
        .iter()
        .filter(|r| r.is_alive() && r.last_seen.elapsed() > heartbeat_timeout)
        .map(|r| r.handle.pid)
        .collect();

    if stale.is_empty() {
        debug!("All workers within heartbeat window");
        return;
    }

    for pid in stale {
        warn!(
            pid = pid,
            timeout_secs = heartbeat_timeout.as_secs(),
            "Worker heartbeat stale, restarting"
        );
        if let Err(e) = engine.restart_worker(registry, pid).await {
            error!(pid = pid, error = %e, "Failed to restart stale worker");
        }
    }
}

/// Drop pending entries older than the configured TTL, if one is set.
pub(crate) fn sweep_pending(pending: &mut PendingTable, ttl: Option<Duration>) {
    let Some(ttl) = ttl else {
        return;
    };
    let dropped = pending.expire_older_than(ttl);
    if dropped > 0 {
        error!(
            dropped = dropped,
            ttl_secs = ttl.as_secs(),
            "Dropped pending messages past their TTL"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Instant;

    use crate::event::event_queue;
    use crate::spawn::MockLauncher;
    use overseer_protocol::WorkerType;

    #[tokio::test]
    async fn test_stale_worker_restarted() {
        let launcher = Arc::new(MockLauncher::new());
        let (events, _rx) = event_queue();
        let engine = SpawnEngine::new(launcher.clone(), events, Duration::from_millis(1));
        let mut registry = WorkerRegistry::new();

        engine
            .create_worker(&mut registry, WorkerType::Database, 2, &BTreeMap::new())
            .await
            .unwrap();
        let pids: Vec<u32> = registry.iter().map(|r| r.handle.pid).collect();

        // First worker went silent 31 seconds ago; the second just beat.
        registry.get_mut(pids[0]).unwrap().last_seen = Instant::now() - Duration::from_secs(31);

        check_worker_health(&mut registry, &engine, Duration::from_secs(30)).await;

        assert!(launcher.is_stopped(pids[0]).await);
        assert!(!launcher.is_stopped(pids[1]).await);
        assert!(registry.get(pids[0]).unwrap().killed);
    }

    #[tokio::test]
    async fn test_already_dead_worker_not_rekilled() {
        let launcher = Arc::new(MockLauncher::new());
        let (events, _rx) = event_queue();
        let engine = SpawnEngine::new(launcher.clone(), events, Duration::from_millis(1));
        let mut registry = WorkerRegistry::new();

        engine
            .create_worker(&mut registry, WorkerType::Http, 1, &BTreeMap::new())
            .await
            .unwrap();
        let pid = registry.iter().next().unwrap().handle.pid;
        {
            let record = registry.get_mut(pid).unwrap();
            record.last_seen = Instant::now() - Duration::from_secs(120);
            record.killed = true;
        }

        check_worker_health(&mut registry, &engine, Duration::from_secs(30)).await;

        // killed flag predates the check; stop was never called again
        assert!(!launcher.is_stopped(pid).await);
    }

    #[test]
    fn test_sweep_disabled_without_ttl() {
        let mut pending = PendingTable::new();
        let env = overseer_protocol::Envelope::ack("m-1");
        pending.track(WorkerType::Database, &env);

        sweep_pending(&mut pending, None);
        assert_eq!(pending.len(WorkerType::Database), 1);
    }

    #[test]
    fn test_sweep_drops_expired_entries() {
        let mut pending = PendingTable::new();
        let env = overseer_protocol::Envelope::ack("m-1");
        pending.track(WorkerType::Database, &env);
        std::thread::sleep(Duration::from_millis(10));

        sweep_pending(&mut pending, Some(Duration::from_millis(1)));
        assert!(pending.is_empty(WorkerType::Database));
    }
}
