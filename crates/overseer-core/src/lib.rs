// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Overseer Core - the supervisor of the worker fleet.
//!
//! Core is responsible for:
//! - Spawning and restarting typed worker processes
//! - Routing every worker message per destination entry
//! - Tracking in-flight messages and replaying them across restarts
//! - Back-pressure (`SERVER_BUSY`) and heartbeat liveness
//!
//! The supervisor is a single actor: one queue, one consumer, no locks.
//! The launcher and the scheduler-state probe are trait seams with mock
//! implementations so the whole routing surface is testable without
//! forking processes.

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod liveness;
pub mod pending;
pub mod registry;
mod router;
pub mod spawn;
pub mod supervisor;
mod watchdog;

pub use config::{Config, ConfigError, WorkerSpec, default_config};
pub use engine::SpawnEngine;
pub use error::{CoreError, Result};
pub use event::{EventSender, SupervisorEvent, event_queue};
pub use liveness::{FixedProbe, ProcState, ProcfsProbe, StateProbe};
pub use pending::{PendingMessage, PendingTable};
pub use registry::{WorkerHandle, WorkerRecord, WorkerRegistry};
pub use spawn::{Launcher, MockLauncher, ProcessLauncher};
pub use supervisor::Supervisor;
