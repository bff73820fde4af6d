// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Child-process launching.
//!
//! The [`Launcher`] trait is the seam between the supervisor and the OS:
//! [`ProcessLauncher`] forks real worker processes, [`MockLauncher`]
//! simulates them for tests. Launchers are pure execution plumbing - the
//! registry and pending table stay with the supervisor.

mod mock;
mod process;

pub use mock::{MockLauncher, MockWorker};
pub use process::ProcessLauncher;

use std::collections::BTreeMap;

use async_trait::async_trait;

use overseer_protocol::WorkerType;

use crate::error::Result;
use crate::event::EventSender;
use crate::registry::WorkerHandle;

/// Launches and stops worker children.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Launch one child of `worker_type`.
    ///
    /// `config` is injected into the child environment. Every inbound
    /// envelope and the eventual exit are reported through `events`; the
    /// returned handle carries the outbound channel.
    async fn launch(
        &self,
        worker_type: WorkerType,
        config: &BTreeMap<String, String>,
        events: EventSender,
    ) -> Result<WorkerHandle>;

    /// Deliver a kill signal to a previously launched child.
    ///
    /// Stopping an already-dead child is not an error; the exit event is
    /// reported through the launch-time `events` channel either way.
    async fn stop(&self, handle: &WorkerHandle) -> Result<()>;
}
