// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The supervisor event loop.
//!
//! A single actor owns the registry and the pending table and consumes one
//! queue fed by every per-child task and timer. Processing one event at a
//! time serializes all state mutation, so the coordinator needs no locks;
//! children are isolated from each other by their process boundary.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use overseer_protocol::{Envelope, WorkerType};

use crate::config::Config;
use crate::engine::SpawnEngine;
use crate::event::{EventReceiver, EventSender, SupervisorEvent, event_queue};
use crate::liveness::{ProcfsProbe, StateProbe};
use crate::pending::PendingTable;
use crate::registry::WorkerRegistry;
use crate::router::{self, RouterContext};
use crate::spawn::Launcher;
use crate::watchdog;
use crate::error::Result;

/// The coordination core: spawns the declared fleet, routes every message,
/// and replays pending work across restarts.
pub struct Supervisor {
    config: Config,
    launcher: Arc<dyn Launcher>,
    registry: WorkerRegistry,
    pending: PendingTable,
    engine: SpawnEngine,
    probe: Box<dyn StateProbe>,
    events_tx: EventSender,
    events_rx: EventReceiver,
}

impl Supervisor {
    /// Supervisor with the procfs scheduler-state probe.
    pub fn new(config: Config, launcher: Arc<dyn Launcher>) -> Self {
        Self::with_probe(config, launcher, Box::new(ProcfsProbe::new()))
    }

    /// Supervisor with a custom scheduler-state probe.
    pub fn with_probe(
        config: Config,
        launcher: Arc<dyn Launcher>,
        probe: Box<dyn StateProbe>,
    ) -> Self {
        let (events_tx, events_rx) = event_queue();
        let engine = SpawnEngine::new(
            launcher.clone(),
            events_tx.clone(),
            config.spawn_retry_backoff,
        );
        Self {
            config,
            launcher,
            registry: WorkerRegistry::new(),
            pending: PendingTable::new(),
            engine,
            probe,
            events_tx,
            events_rx,
        }
    }

    /// Sender half of the event queue, for feeding events from outside the
    /// per-child tasks (tests, embedders).
    pub fn event_sender(&self) -> EventSender {
        self.events_tx.clone()
    }

    /// Spawn the declared fleet, then serve events until `shutdown` fires.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        self.start_workers().await?;

        let mut watchdog_tick = tokio::time::interval(self.config.watchdog_poll);
        watchdog_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        watchdog_tick.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Supervisor received shutdown signal");
                    break;
                }

                _ = watchdog_tick.tick() => {
                    watchdog::check_worker_health(
                        &mut self.registry,
                        &self.engine,
                        self.config.heartbeat_timeout,
                    )
                    .await;
                    watchdog::sweep_pending(&mut self.pending, self.config.pending_ttl);
                }

                event = self.events_rx.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
            }
        }

        self.stop_all().await;
        Ok(())
    }

    /// One set of each declared worker type. A type that could not start a
    /// single instance after retries is fatal.
    async fn start_workers(&mut self) -> Result<()> {
        for spec in self.config.workers.clone() {
            self.engine
                .create_worker(
                    &mut self.registry,
                    spec.worker_type,
                    spec.count,
                    &spec.config,
                )
                .await?;
            if self.registry.first_alive(spec.worker_type).is_none() {
                return Err(crate::error::CoreError::Spawn {
                    worker_type: spec.worker_type,
                    reason: "no instance could be started".to_string(),
                });
            }
        }
        info!(workers = ?self.registry.counts(), "Worker fleet started");
        Ok(())
    }

    async fn handle_event(&mut self, event: SupervisorEvent) {
        match event {
            SupervisorEvent::Inbound { pid, envelope } => {
                let mut ctx = self.router_context();
                router::on_worker_message(&mut ctx, envelope, pid).await;
            }
            SupervisorEvent::Exited {
                pid,
                worker_type,
                exit_code,
            } => {
                self.handle_exit(pid, worker_type, exit_code).await;
            }
            SupervisorEvent::Retry {
                worker_type,
                envelope,
            } => {
                self.handle_retry(worker_type, envelope).await;
            }
        }
    }

    fn router_context(&mut self) -> RouterContext<'_> {
        RouterContext {
            registry: &mut self.registry,
            pending: &mut self.pending,
            engine: &self.engine,
            probe: self.probe.as_ref(),
            config: &self.config,
            events: &self.events_tx,
        }
    }

    /// Exit path: replace the child, then drain the type's pending list to
    /// the replacement. Router-initiated restarts land here too, via the
    /// exit their kill produces.
    async fn handle_exit(&mut self, pid: u32, worker_type: WorkerType, exit_code: Option<i32>) {
        if self.registry.remove(pid).is_none() {
            debug!(pid = pid, "Exit for unregistered worker, ignoring");
            return;
        }

        warn!(
            pid = pid,
            worker_type = %worker_type,
            exit_code = ?exit_code,
            "Worker exited, replacing"
        );

        let config = self.config.config_for(worker_type);
        if let Err(e) = self
            .engine
            .create_worker(&mut self.registry, worker_type, 1, &config)
            .await
        {
            error!(
                worker_type = %worker_type,
                error = %e,
                "Failed to replace exited worker"
            );
            return;
        }
        self.engine
            .drain_pending(&self.registry, &self.pending, worker_type);
    }

    /// Deferred re-route: every candidate was saturated when the message
    /// first came through.
    async fn handle_retry(&mut self, worker_type: WorkerType, envelope: Envelope) {
        info!(
            message_id = %envelope.message_id,
            worker_type = %worker_type,
            "Retrying deferred message"
        );
        let mut spawned = HashSet::new();
        let mut ctx = self.router_context();
        router::forward_to_peer(&mut ctx, None, envelope, worker_type, None, &mut spawned).await;
    }

    async fn stop_all(&mut self) {
        info!(count = self.registry.len(), "Stopping worker fleet");
        for record in self.registry.iter() {
            if let Err(e) = self.launcher.stop(&record.handle).await {
                error!(pid = record.handle.pid, error = %e, "Failed to stop worker");
            }
        }
    }
}
