// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Overseer SDK - the worker side of the supervisor contract.
//!
//! Every worker process in the fleet:
//! - generates a stable `<TypeName>-<uuid>` instance id at startup
//! - beats `{status: healthy}` to the supervisor every 10 seconds
//! - filters inbound destinations down to its own type
//! - dispatches `method/arg` through an explicit handler table
//! - declines with `SERVER_BUSY` while a task is in flight
//! - emits a `completed` reply naming the next-hop workers
//!
//! [`WorkerRuntime`] implements all of it over the channel inherited from
//! the supervisor; a worker binary only registers handlers:
//!
//! ```ignore
//! use std::sync::Arc;
//! use overseer_protocol::inherited_channel;
//! use overseer_sdk::{ProjectStore, WorkerRuntime, database_handlers};
//!
//! #[tokio::main]
//! async fn main() -> overseer_sdk::Result<()> {
//!     let config = overseer_sdk::WorkerConfig::from_env()?;
//!     let handlers = database_handlers(Arc::new(ProjectStore::new()));
//!     let runtime = WorkerRuntime::new(config.worker_type, handlers);
//!     runtime.run(inherited_channel()?).await
//! }
//! ```

mod config;
mod error;
mod handlers;
mod runtime;
mod store;

pub use config::{DEFAULT_HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL_ENV, WorkerConfig};
pub use error::{Result, SdkError};
pub use handlers::{
    HandlerFuture, HandlerTable, REASON_UNKNOWN_METHOD, Reply, reply_destinations,
};
pub use runtime::WorkerRuntime;
pub use store::{
    ProjectStore, database_handlers, graphql_handlers, http_handlers, queue_handlers,
};
