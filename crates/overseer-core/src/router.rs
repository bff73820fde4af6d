// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message routing.
//!
//! Every inbound envelope is split per destination entry and each entry is
//! an independent routing decision: handled by the supervisor itself,
//! forwarded to an eligible peer, answered with fresh capacity, or
//! deferred when every candidate is saturated.
//!
//! Intent is always recorded in the pending table *before* a send, so a
//! worker crash between track and delivery cannot lose the message; the
//! drain after the replacement registers re-delivers it.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use overseer_protocol::{Destination, Envelope, Status, Target, WorkerType};

use crate::config::Config;
use crate::engine::SpawnEngine;
use crate::event::{EventSender, SupervisorEvent};
use crate::liveness::{ProcState, StateProbe};
use crate::pending::PendingTable;
use crate::registry::WorkerRegistry;

/// Borrowed supervisor state the router operates on. All of it lives on
/// the supervisor task.
pub(crate) struct RouterContext<'a> {
    pub registry: &'a mut WorkerRegistry,
    pub pending: &'a mut PendingTable,
    pub engine: &'a SpawnEngine,
    pub probe: &'a dyn StateProbe,
    pub config: &'a Config,
    pub events: &'a EventSender,
}

/// Entry point for every envelope a child sends.
pub(crate) async fn on_worker_message(
    ctx: &mut RouterContext<'_>,
    envelope: Envelope,
    from_pid: u32,
) {
    if let Err(e) = envelope.validate() {
        error!(pid = from_pid, error = %e, "Dropping invalid envelope");
        return;
    }

    // Any completed envelope acknowledges the hop its sender just
    // finished, whether or not `supervisor` is among its destinations.
    if envelope.status == Status::Completed
        && let Some(sender_type) = ctx.registry.get(from_pid).map(|r| r.handle.worker_type)
        && ctx.pending.remove(sender_type, &envelope.message_id)
    {
        info!(
            message_id = %envelope.message_id,
            worker_type = %sender_type,
            "Pending message acknowledged"
        );
    }

    let mut spawned_types: HashSet<WorkerType> = HashSet::new();

    for raw in envelope.destination.clone() {
        let dest = match Destination::parse(&raw) {
            Ok(dest) => dest,
            Err(e) => {
                error!(
                    pid = from_pid,
                    destination = %raw,
                    error = %e,
                    "Undeliverable destination, skipping"
                );
                continue;
            }
        };

        match dest.target {
            Target::Supervisor => {
                handle_supervisor_destination(ctx, &envelope, from_pid, &mut spawned_types).await;
            }
            Target::Worker(worker_type) => {
                let exclude = if envelope.is_server_busy() {
                    Some(from_pid)
                } else {
                    None
                };
                let copy = envelope.single_destination(&raw);
                forward_to_peer(
                    ctx,
                    Some(from_pid),
                    copy,
                    worker_type,
                    exclude,
                    &mut spawned_types,
                )
                .await;
            }
        }
    }
}

/// Terminal signals addressed to the coordinator itself.
async fn handle_supervisor_destination(
    ctx: &mut RouterContext<'_>,
    envelope: &Envelope,
    from_pid: u32,
    spawned: &mut HashSet<WorkerType>,
) {
    match envelope.status {
        Status::Healthy => {
            if ctx.registry.record_heartbeat(from_pid) {
                debug!(pid = from_pid, "Heartbeat recorded");
            } else {
                warn!(pid = from_pid, "Heartbeat from unknown worker");
            }
        }
        Status::Completed => {
            debug!(message_id = %envelope.message_id, "Completion ack received");
        }
        Status::Failed if envelope.is_server_busy() => {
            rehome_declined_message(ctx, envelope, from_pid, spawned).await;
        }
        _ => {
            warn!(
                pid = from_pid,
                message_id = %envelope.message_id,
                status = envelope.status.as_str(),
                reason = ?envelope.reason,
                "Unhandled supervisor-destined envelope, dropping"
            );
        }
    }
}

/// A worker declined a message with `SERVER_BUSY`: find the pending
/// original under the sender's type and re-run selection without the
/// sender.
async fn rehome_declined_message(
    ctx: &mut RouterContext<'_>,
    envelope: &Envelope,
    from_pid: u32,
    spawned: &mut HashSet<WorkerType>,
) {
    let Some(sender_type) = ctx.registry.get(from_pid).map(|r| r.handle.worker_type) else {
        warn!(pid = from_pid, "SERVER_BUSY from unknown worker");
        return;
    };
    let Some(original) = ctx
        .pending
        .get(sender_type, &envelope.message_id)
        .cloned()
    else {
        warn!(
            pid = from_pid,
            message_id = %envelope.message_id,
            "SERVER_BUSY for a message that is not tracked"
        );
        return;
    };

    info!(
        pid = from_pid,
        message_id = %envelope.message_id,
        worker_type = %sender_type,
        "Worker declined message, re-homing"
    );
    forward_to_peer(ctx, Some(from_pid), original, sender_type, Some(from_pid), spawned).await;
}

/// Route one single-destination envelope to a worker of `worker_type`.
pub(crate) async fn forward_to_peer(
    ctx: &mut RouterContext<'_>,
    from_pid: Option<u32>,
    envelope: Envelope,
    worker_type: WorkerType,
    exclude: Option<u32>,
    spawned: &mut HashSet<WorkerType>,
) {
    // Record intent before sending.
    if ctx.pending.track(worker_type, &envelope) {
        info!(
            message_id = %envelope.message_id,
            worker_type = %worker_type,
            "Tracking in-flight message"
        );
    }

    // Error envelopes restart their sender instead of being forwarded.
    if envelope.status == Status::Error {
        error!(
            message_id = %envelope.message_id,
            reason = ?envelope.reason,
            "Worker reported a non-recoverable error"
        );
        if let Some(pid) = from_pid
            && ctx.registry.get(pid).is_some()
            && let Err(e) = ctx.engine.restart_worker(ctx.registry, pid).await
        {
            error!(pid = pid, error = %e, "Failed to restart errored worker");
        }
        return;
    }

    // Alive peers not currently on a CPU, registration order.
    let candidates: Vec<u32> = ctx
        .registry
        .alive_of_type(worker_type)
        .filter(|r| ctx.probe.process_state(r.handle.pid) != ProcState::Running)
        .map(|r| r.handle.pid)
        .collect();

    // No capacity at all: add some, the post-spawn drain re-delivers.
    if candidates.is_empty() {
        if spawned.insert(worker_type) {
            info!(worker_type = %worker_type, "No eligible worker, spawning one");
            let config = ctx.config.config_for(worker_type);
            match ctx
                .engine
                .create_worker(ctx.registry, worker_type, 1, &config)
                .await
            {
                Ok(()) => ctx.engine.drain_pending(ctx.registry, ctx.pending, worker_type),
                Err(e) => error!(
                    worker_type = %worker_type,
                    error = %e,
                    "Failed to add worker capacity"
                ),
            }
        }
        return;
    }

    let candidates: Vec<u32> = match exclude {
        Some(excluded) => candidates.into_iter().filter(|c| *c != excluded).collect(),
        None => candidates,
    };

    // Everyone eligible declined or is saturated: come back later.
    if candidates.is_empty() {
        info!(
            message_id = %envelope.message_id,
            worker_type = %worker_type,
            delay_ms = ctx.config.busy_retry_delay.as_millis() as u64,
            "All candidates busy, scheduling retry"
        );
        schedule_retry(
            ctx.events.clone(),
            worker_type,
            envelope,
            ctx.config.busy_retry_delay,
        );
        return;
    }

    let target = candidates[0];
    let Some(record) = ctx.registry.get(target) else {
        error!(pid = target, "Candidate vanished from registry");
        return;
    };
    if !record.is_alive() {
        error!(
            pid = target,
            message_id = %envelope.message_id,
            "Send to dead worker skipped"
        );
        return;
    }

    let message_id = envelope.message_id.clone();
    match record.handle.send(envelope) {
        Ok(()) => info!(
            message_id = %message_id,
            pid = target,
            worker_type = %worker_type,
            "Forwarded message"
        ),
        Err(e) => error!(
            message_id = %message_id,
            pid = target,
            error = %e,
            "Send to dead worker channel"
        ),
    }
}

fn schedule_retry(
    events: EventSender,
    worker_type: WorkerType,
    envelope: Envelope,
    delay: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = events.send(SupervisorEvent::Retry {
            worker_type,
            envelope,
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::{Arc, Mutex};

    use serde_json::json;
    use tokio::sync::mpsc;

    use overseer_protocol::SUPERVISOR_TARGET;

    use crate::event::{EventReceiver, event_queue};
    use crate::spawn::MockLauncher;

    /// Probe with scripted per-pid states; unknown pids read as idle.
    #[derive(Default)]
    struct MapProbe {
        states: Mutex<HashMap<u32, ProcState>>,
    }

    impl MapProbe {
        fn set(&self, pid: u32, state: ProcState) {
            self.states.lock().unwrap().insert(pid, state);
        }
    }

    impl StateProbe for MapProbe {
        fn process_state(&self, pid: u32) -> ProcState {
            self.states
                .lock()
                .unwrap()
                .get(&pid)
                .copied()
                .unwrap_or(ProcState::Idle)
        }
    }

    struct Harness {
        registry: WorkerRegistry,
        pending: PendingTable,
        engine: SpawnEngine,
        probe: MapProbe,
        config: Config,
        events: EventSender,
        events_rx: EventReceiver,
        launcher: Arc<MockLauncher>,
    }

    impl Harness {
        fn new() -> Self {
            let launcher = Arc::new(MockLauncher::new());
            let (events, events_rx) = event_queue();
            let engine = SpawnEngine::new(launcher.clone(), events.clone(), Duration::from_millis(1));
            let config = Config {
                busy_retry_delay: Duration::from_millis(10),
                ..Config::default()
            };
            Self {
                registry: WorkerRegistry::new(),
                pending: PendingTable::new(),
                engine,
                probe: MapProbe::default(),
                config,
                events,
                events_rx,
                launcher,
            }
        }

        async fn spawn(&mut self, worker_type: WorkerType, count: usize) -> Vec<u32> {
            let before = self.launcher.launch_count().await;
            self.engine
                .create_worker(&mut self.registry, worker_type, count, &BTreeMap::new())
                .await
                .unwrap();
            self.launcher.launches().await[before..]
                .iter()
                .map(|(pid, _)| *pid)
                .collect()
        }

        async fn deliver(&mut self, envelope: Envelope, from_pid: u32) {
            let mut ctx = RouterContext {
                registry: &mut self.registry,
                pending: &mut self.pending,
                engine: &self.engine,
                probe: &self.probe,
                config: &self.config,
                events: &self.events,
            };
            on_worker_message(&mut ctx, envelope, from_pid).await;
        }
    }

    fn request(id: &str, destination: &str) -> Envelope {
        let mut env = Envelope::new(
            Status::Completed,
            vec![destination.to_string()],
            json!({"title": "T"}),
        );
        env.message_id = id.to_string();
        env
    }

    async fn next_envelope(inbox: &mut mpsc::UnboundedReceiver<Envelope>) -> Envelope {
        tokio::time::timeout(Duration::from_secs(1), inbox.recv())
            .await
            .expect("timed out waiting for envelope")
            .expect("inbox closed")
    }

    #[tokio::test]
    async fn test_forwards_to_first_alive_candidate() {
        let mut h = Harness::new();
        let db = h.spawn(WorkerType::Database, 2).await;
        let http = h.spawn(WorkerType::Http, 1).await;

        h.deliver(request("m-1", "DatabaseWorker/createNewData"), http[0])
            .await;

        let mut inbox = h.launcher.take_inbox(db[0]).await.unwrap();
        let delivered = next_envelope(&mut inbox).await;
        assert_eq!(delivered.message_id, "m-1");
        assert_eq!(delivered.destination, vec!["DatabaseWorker/createNewData"]);
        assert_eq!(h.pending.len(WorkerType::Database), 1);
    }

    #[tokio::test]
    async fn test_completion_ack_removes_pending() {
        let mut h = Harness::new();
        let db = h.spawn(WorkerType::Database, 1).await;
        let http = h.spawn(WorkerType::Http, 1).await;

        h.deliver(request("m-1", "DatabaseWorker/createNewData"), http[0])
            .await;
        assert_eq!(h.pending.len(WorkerType::Database), 1);

        h.deliver(Envelope::ack("m-1"), db[0]).await;
        assert!(h.pending.is_empty(WorkerType::Database));
    }

    #[tokio::test]
    async fn test_completed_fanout_acks_sender_and_tracks_next_hops() {
        let mut h = Harness::new();
        let db = h.spawn(WorkerType::Database, 1).await;
        let http = h.spawn(WorkerType::Http, 1).await;
        let queue = h.spawn(WorkerType::Queue, 1).await;

        h.deliver(request("m-1", "DatabaseWorker/createNewData"), http[0])
            .await;

        // Database worker completes with a fan-out to both next hops.
        let mut reply = request("m-1", "ignored");
        reply.destination = vec![
            "HttpWorker/onProcessedMessage".to_string(),
            "QueueWorker/produceMessage".to_string(),
            SUPERVISOR_TARGET.to_string(),
        ];
        h.deliver(reply, db[0]).await;

        // The database hop is acked, the fan-out hops are now in flight.
        assert!(h.pending.is_empty(WorkerType::Database));
        assert_eq!(h.pending.len(WorkerType::Http), 1);
        assert_eq!(h.pending.len(WorkerType::Queue), 1);

        let mut http_inbox = h.launcher.take_inbox(http[0]).await.unwrap();
        assert_eq!(next_envelope(&mut http_inbox).await.message_id, "m-1");
        let mut queue_inbox = h.launcher.take_inbox(queue[0]).await.unwrap();
        assert_eq!(next_envelope(&mut queue_inbox).await.message_id, "m-1");
    }

    #[tokio::test]
    async fn test_server_busy_fails_over_to_other_peer() {
        let mut h = Harness::new();
        let db = h.spawn(WorkerType::Database, 2).await;
        let http = h.spawn(WorkerType::Http, 1).await;

        h.deliver(request("m-1", "DatabaseWorker/createNewData"), http[0])
            .await;
        let mut first_inbox = h.launcher.take_inbox(db[0]).await.unwrap();
        assert_eq!(next_envelope(&mut first_inbox).await.message_id, "m-1");

        // First worker declines.
        h.deliver(Envelope::busy("m-1"), db[0]).await;

        let mut second_inbox = h.launcher.take_inbox(db[1]).await.unwrap();
        let rerouted = next_envelope(&mut second_inbox).await;
        assert_eq!(rerouted.message_id, "m-1");
        // Still tracked until the second worker acks.
        assert_eq!(h.pending.len(WorkerType::Database), 1);
    }

    #[tokio::test]
    async fn test_server_busy_with_single_peer_schedules_retry() {
        let mut h = Harness::new();
        let db = h.spawn(WorkerType::Database, 1).await;
        let http = h.spawn(WorkerType::Http, 1).await;

        h.deliver(request("m-1", "DatabaseWorker/createNewData"), http[0])
            .await;
        h.deliver(Envelope::busy("m-1"), db[0]).await;

        // No other candidate: the original is re-enqueued after the delay.
        let event = tokio::time::timeout(Duration::from_secs(1), h.events_rx.recv())
            .await
            .expect("retry never scheduled")
            .unwrap();
        match event {
            SupervisorEvent::Retry {
                worker_type,
                envelope,
            } => {
                assert_eq!(worker_type, WorkerType::Database);
                assert_eq!(envelope.message_id, "m-1");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(h.pending.len(WorkerType::Database), 1);
    }

    #[tokio::test]
    async fn test_running_state_peers_are_skipped() {
        let mut h = Harness::new();
        let db = h.spawn(WorkerType::Database, 2).await;
        let http = h.spawn(WorkerType::Http, 1).await;

        // First-registered worker is on a CPU; the idle sibling wins.
        h.probe.set(db[0], ProcState::Running);
        h.deliver(request("m-1", "DatabaseWorker/getData"), http[0])
            .await;

        let mut second_inbox = h.launcher.take_inbox(db[1]).await.unwrap();
        assert_eq!(next_envelope(&mut second_inbox).await.message_id, "m-1");
    }

    #[tokio::test]
    async fn test_dead_worker_never_selected() {
        let mut h = Harness::new();
        let db = h.spawn(WorkerType::Database, 2).await;
        let http = h.spawn(WorkerType::Http, 1).await;

        h.registry.get_mut(db[0]).unwrap().killed = true;
        h.deliver(request("m-1", "DatabaseWorker/getData"), http[0])
            .await;

        let mut second_inbox = h.launcher.take_inbox(db[1]).await.unwrap();
        assert_eq!(next_envelope(&mut second_inbox).await.message_id, "m-1");
    }

    #[tokio::test]
    async fn test_dead_channel_send_not_retried_inline() {
        let mut h = Harness::new();
        let db = h.spawn(WorkerType::Database, 1).await;
        let http = h.spawn(WorkerType::Http, 1).await;

        // Simulate a channel torn down between the liveness check and the
        // send by dropping the worker's inbox.
        drop(h.launcher.take_inbox(db[0]).await.unwrap());
        let launches_before = h.launcher.launch_count().await;

        h.deliver(request("m-1", "DatabaseWorker/getData"), http[0])
            .await;

        // Tracked but neither respawned nor re-scheduled inline.
        assert_eq!(h.pending.len(WorkerType::Database), 1);
        assert_eq!(h.launcher.launch_count().await, launches_before);
        assert!(h.events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_spawn_on_absence_at_most_once_per_message() {
        let mut h = Harness::new();
        let http = h.spawn(WorkerType::Http, 1).await;
        let launches_before = h.launcher.launch_count().await;

        // Two destinations to the same missing type in one envelope.
        let mut env = request("m-1", "DatabaseWorker/createNewData");
        env.destination = vec![
            "DatabaseWorker/createNewData".to_string(),
            "DatabaseWorker/getData".to_string(),
        ];
        h.deliver(env, http[0]).await;

        assert_eq!(h.launcher.launch_count().await, launches_before + 1);
        let new_db = h.launcher.pids_of_type(WorkerType::Database).await;
        assert_eq!(new_db.len(), 1);

        // The post-spawn drain delivered both tracked messages.
        let mut inbox = h.launcher.take_inbox(new_db[0]).await.unwrap();
        assert_eq!(next_envelope(&mut inbox).await.message_id, "m-1");
    }

    #[tokio::test]
    async fn test_error_status_restarts_sender_without_forwarding() {
        let mut h = Harness::new();
        let db = h.spawn(WorkerType::Database, 1).await;
        let queue = h.spawn(WorkerType::Queue, 1).await;

        let mut env = request("m-9", "QueueWorker/produceMessage");
        env.status = Status::Error;
        env.reason = Some("mongo connection lost".to_string());
        h.deliver(env, db[0]).await;

        assert!(h.launcher.is_stopped(db[0]).await);
        // Tracked before the error short-circuit, but never forwarded.
        assert_eq!(h.pending.len(WorkerType::Queue), 1);
        let mut queue_inbox = h.launcher.take_inbox(queue[0]).await.unwrap();
        assert!(queue_inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_heartbeat_updates_registry() {
        let mut h = Harness::new();
        let db = h.spawn(WorkerType::Database, 1).await;
        let before = h.registry.get(db[0]).unwrap().last_seen;

        tokio::time::sleep(Duration::from_millis(5)).await;
        h.deliver(Envelope::healthy("DatabaseWorker-abc"), db[0]).await;

        assert!(h.registry.get(db[0]).unwrap().last_seen > before);
    }

    #[tokio::test]
    async fn test_unknown_destination_type_skipped() {
        let mut h = Harness::new();
        let http = h.spawn(WorkerType::Http, 1).await;
        let launches_before = h.launcher.launch_count().await;

        h.deliver(request("m-1", "CrawlerWorker/start"), http[0]).await;

        // Nothing tracked, nothing spawned.
        for ty in WorkerType::ALL {
            assert!(h.pending.is_empty(ty));
        }
        assert_eq!(h.launcher.launch_count().await, launches_before);
    }
}
