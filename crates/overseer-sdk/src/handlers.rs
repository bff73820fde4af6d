// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Handler tables.
//!
//! A worker exposes its operations as an explicit table keyed by method
//! name: the second segment of a destination selects the handler, the
//! remainder is the handler's argument. Unknown methods produce a `failed`
//! reply, never a panic.

use std::collections::HashMap;
use std::pin::Pin;

use serde_json::Value;

use overseer_protocol::{Envelope, Status};

/// Reason code for a destination naming no registered method.
pub const REASON_UNKNOWN_METHOD: &str = "UNKNOWN_METHOD";

/// What a handler produced: the runtime turns this into the reply envelope
/// carrying the request's `messageId`.
#[derive(Debug, Clone)]
pub struct Reply {
    /// Outcome of the operation.
    pub status: Status,
    /// Optional short code accompanying `failed`.
    pub reason: Option<String>,
    /// Next-hop destinations. Left empty, the reply goes to the supervisor
    /// only; on `completed` the runtime appends the supervisor ack.
    pub destination: Vec<String>,
    /// Result payload.
    pub data: Value,
}

impl Reply {
    /// Successful completion with a result and next hops.
    pub fn completed(data: Value, destination: Vec<String>) -> Self {
        Self {
            status: Status::Completed,
            reason: None,
            destination,
            data,
        }
    }

    /// Recoverable failure with a reason code.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: Status::Failed,
            reason: Some(reason.into()),
            destination: Vec::new(),
            data: Value::Null,
        }
    }

    /// Route this reply to the given next hops instead of the supervisor.
    /// Domain failures use this to travel back to the requesting worker.
    pub fn with_destination(mut self, destination: Vec<String>) -> Self {
        self.destination = destination;
        self
    }
}

/// Future type produced by handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Reply> + Send + 'static>>;

type HandlerFn = Box<dyn Fn(Option<String>, Envelope) -> HandlerFuture + Send + Sync>;

/// Method-name-keyed dispatch table of one worker.
#[derive(Default)]
pub struct HandlerTable {
    handlers: HashMap<String, HandlerFn>,
}

impl HandlerTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a method name.
    pub fn register<F, Fut>(&mut self, method: &str, handler: F)
    where
        F: Fn(Option<String>, Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Reply> + Send + 'static,
    {
        self.handlers.insert(
            method.to_string(),
            Box::new(move |arg, envelope| Box::pin(handler(arg, envelope))),
        );
    }

    /// True when a method is registered.
    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Invoke the handler for a method, if registered.
    pub fn dispatch(
        &self,
        method: &str,
        arg: Option<String>,
        envelope: Envelope,
    ) -> Option<HandlerFuture> {
        self.handlers.get(method).map(|h| h(arg, envelope))
    }

    /// Registered method names.
    pub fn methods(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

/// Next-hop destinations a requester asked for, from the conventional
/// `replyTo` array in the request payload.
pub fn reply_destinations(envelope: &Envelope) -> Vec<String> {
    envelope
        .data
        .get("replyTo")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
