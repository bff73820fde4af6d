// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Destination grammar.
//!
//! `destination := "supervisor" | WorkerType ("/" Segment)*`
//!
//! The first `/`-delimited segment is the routing key; everything after it
//! is opaque to the router and interpreted by the addressed worker. Worker
//! types are a closed set - the string form exists only on the wire, and an
//! unknown type is a typed error, never a panic.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::envelope::SUPERVISOR_TARGET;
use crate::error::{ProtocolError, Result};

/// The declared worker types of the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerType {
    /// Persistence worker (project documents).
    Database,
    /// REST front-end worker.
    Http,
    /// AMQP producer/consumer worker.
    Queue,
    /// GraphQL front-end worker.
    Graphql,
}

impl WorkerType {
    /// All declared types, in spawn order.
    pub const ALL: [WorkerType; 4] = [
        WorkerType::Database,
        WorkerType::Http,
        WorkerType::Queue,
        WorkerType::Graphql,
    ];

    /// Wire spelling used in destination strings.
    pub fn wire_name(&self) -> &'static str {
        match self {
            WorkerType::Database => "DatabaseWorker",
            WorkerType::Http => "HttpWorker",
            WorkerType::Queue => "QueueWorker",
            WorkerType::Graphql => "GraphqlWorker",
        }
    }
}

impl fmt::Display for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl TryFrom<&str> for WorkerType {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "DatabaseWorker" => Ok(WorkerType::Database),
            "HttpWorker" => Ok(WorkerType::Http),
            "QueueWorker" => Ok(WorkerType::Queue),
            "GraphqlWorker" => Ok(WorkerType::Graphql),
            other => Err(ProtocolError::UnknownWorkerType(other.to_string())),
        }
    }
}

/// Resolved routing target of one destination entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The coordinator itself.
    Supervisor,
    /// A peer worker of the given type.
    Worker(WorkerType),
}

/// A parsed destination string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Where the entry routes.
    pub target: Target,
    /// Second path segment, if present.
    pub method: Option<String>,
    /// Remaining segments joined back with `/`, if present.
    pub arg: Option<String>,
}

impl Destination {
    /// Parse a destination string.
    ///
    /// The routing key must be the literal `supervisor` or a declared
    /// worker type matching `[A-Za-z][A-Za-z0-9]*`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut segments = raw.split('/');
        let key = segments.next().unwrap_or_default();

        if key.is_empty() || !valid_routing_key(key) {
            return Err(ProtocolError::MalformedDestination(raw.to_string()));
        }

        let method = segments.next().map(str::to_string);
        let rest: Vec<&str> = segments.collect();
        let arg = if rest.is_empty() {
            None
        } else {
            Some(rest.join("/"))
        };

        let target = if key == SUPERVISOR_TARGET {
            Target::Supervisor
        } else {
            Target::Worker(WorkerType::try_from(key)?)
        };

        Ok(Self {
            target,
            method,
            arg,
        })
    }

    /// Routing key of an unparsed destination string (text before the
    /// first `/`, or the whole string).
    pub fn routing_key(raw: &str) -> &str {
        raw.split('/').next().unwrap_or(raw)
    }
}

fn valid_routing_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_type_round_trip() {
        for ty in WorkerType::ALL {
            let parsed = WorkerType::try_from(ty.wire_name()).unwrap();
            assert_eq!(parsed, ty);
        }
    }

    #[test]
    fn test_parse_bare_type() {
        let dest = Destination::parse("DatabaseWorker").unwrap();
        assert_eq!(dest.target, Target::Worker(WorkerType::Database));
        assert!(dest.method.is_none());
        assert!(dest.arg.is_none());
    }

    #[test]
    fn test_parse_method_and_arg() {
        let dest = Destination::parse("DatabaseWorker/getDataById/X").unwrap();
        assert_eq!(dest.target, Target::Worker(WorkerType::Database));
        assert_eq!(dest.method.as_deref(), Some("getDataById"));
        assert_eq!(dest.arg.as_deref(), Some("X"));
    }

    #[test]
    fn test_arg_keeps_extra_segments() {
        let dest = Destination::parse("QueueWorker/produceMessage/a/b/c").unwrap();
        assert_eq!(dest.arg.as_deref(), Some("a/b/c"));
    }

    #[test]
    fn test_parse_supervisor() {
        let dest = Destination::parse("supervisor").unwrap();
        assert_eq!(dest.target, Target::Supervisor);
    }

    #[test]
    fn test_unknown_type_is_error() {
        let err = Destination::parse("CrawlerWorker/start").unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownWorkerType(t) if t == "CrawlerWorker"));
    }

    #[test]
    fn test_malformed_keys_rejected() {
        for raw in ["", "/leading", "1Worker/x", "Data-Base/x"] {
            let err = Destination::parse(raw).unwrap_err();
            assert!(
                matches!(err, ProtocolError::MalformedDestination(_)),
                "{raw:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_routing_key_split() {
        assert_eq!(Destination::routing_key("HttpWorker/onProcessedMessage"), "HttpWorker");
        assert_eq!(Destination::routing_key("supervisor"), "supervisor");
    }
}
