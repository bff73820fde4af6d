// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The message envelope.
//!
//! One envelope is one unit of routing: a worker emits it, the supervisor
//! fans it out per destination entry, and the addressee replies with a new
//! envelope carrying the same `messageId`. The wire field names are fixed
//! (`messageId`, `status`, `reason`, `destination`, `data`) and every side
//! of the system serializes them identically.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::{ProtocolError, Result};

/// Reason code a worker uses to decline a message it cannot take right now.
pub const REASON_SERVER_BUSY: &str = "SERVER_BUSY";

/// Reason code for a lookup that matched nothing.
pub const REASON_NO_DATA: &str = "NO_DATA";

/// Destination literal that routes to the supervisor itself.
pub const SUPERVISOR_TARGET: &str = "supervisor";

/// Terminal state of the message the envelope reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The operation finished; `data` holds the result.
    Completed,
    /// The operation was declined or failed in a recoverable way; see `reason`.
    Failed,
    /// The worker hit a non-recoverable error and is about to exit.
    Error,
    /// Liveness beat; carries `{instanceId, timestamp}` in `data`.
    Healthy,
}

impl Status {
    /// Wire spelling of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Error => "error",
            Status::Healthy => "healthy",
        }
    }
}

/// The single in-transit record of the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Unique per logical request, generated by the originating worker.
    pub message_id: String,
    /// Outcome or liveness state this envelope reports.
    pub status: Status,
    /// Optional short code accompanying `failed`/`error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Ordered destination strings, each `WorkerType[/method[/arg]]` or
    /// the literal `supervisor`.
    #[serde(default)]
    pub destination: Vec<String>,
    /// Opaque payload.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// New envelope with a fresh message id.
    pub fn new(status: Status, destination: Vec<String>, data: Value) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            status,
            reason: None,
            destination,
            data,
        }
    }

    /// Reply envelope: same message id, new status/destination/payload.
    pub fn reply(&self, status: Status, destination: Vec<String>, data: Value) -> Self {
        Self {
            message_id: self.message_id.clone(),
            status,
            reason: None,
            destination,
            data,
        }
    }

    /// Attach a reason code.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Heartbeat envelope for the given worker instance.
    pub fn healthy(instance_id: &str) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            status: Status::Healthy,
            reason: None,
            destination: vec![SUPERVISOR_TARGET.to_string()],
            data: json!({
                "instanceId": instance_id,
                "timestamp": now_millis(),
            }),
        }
    }

    /// Pure completion ack for the pending table.
    pub fn ack(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            status: Status::Completed,
            reason: None,
            destination: vec![SUPERVISOR_TARGET.to_string()],
            data: Value::Null,
        }
    }

    /// Back-pressure reply: the sender is saturated and declines the message.
    pub fn busy(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            status: Status::Failed,
            reason: Some(REASON_SERVER_BUSY.to_string()),
            destination: vec![SUPERVISOR_TARGET.to_string()],
            data: Value::Null,
        }
    }

    /// Copy of this envelope narrowed to a single destination entry.
    pub fn single_destination(&self, destination: &str) -> Self {
        Self {
            message_id: self.message_id.clone(),
            status: self.status,
            reason: self.reason.clone(),
            destination: vec![destination.to_string()],
            data: self.data.clone(),
        }
    }

    /// True when the reason code is `SERVER_BUSY`.
    pub fn is_server_busy(&self) -> bool {
        self.status == Status::Failed && self.reason.as_deref() == Some(REASON_SERVER_BUSY)
    }

    /// True for a `completed` envelope addressed only to the supervisor.
    pub fn is_pure_ack(&self) -> bool {
        self.status == Status::Completed
            && self.destination.len() == 1
            && self.destination[0] == SUPERVISOR_TARGET
    }

    /// Check the structural invariants.
    ///
    /// A routed envelope must carry a message id and at least one
    /// destination; a heartbeat may only be addressed to the supervisor.
    pub fn validate(&self) -> Result<()> {
        if self.message_id.is_empty() {
            return Err(ProtocolError::InvalidEnvelope("empty messageId"));
        }
        if self.destination.is_empty() && self.status != Status::Healthy {
            return Err(ProtocolError::InvalidEnvelope("empty destination"));
        }
        if self.status == Status::Healthy
            && !self
                .destination
                .iter()
                .all(|d| d == SUPERVISOR_TARGET)
        {
            return Err(ProtocolError::InvalidEnvelope(
                "healthy envelope routed to a peer",
            ));
        }
        Ok(())
    }
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let env = Envelope {
            message_id: "m-1".to_string(),
            status: Status::Completed,
            reason: None,
            destination: vec!["DatabaseWorker/createNewData".to_string()],
            data: json!({"title": "T"}),
        };

        let wire = serde_json::to_value(&env).unwrap();
        assert_eq!(wire["messageId"], "m-1");
        assert_eq!(wire["status"], "completed");
        assert_eq!(wire["destination"][0], "DatabaseWorker/createNewData");
        assert_eq!(wire["data"]["title"], "T");
        // reason is omitted entirely when absent
        assert!(wire.get("reason").is_none());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            Status::Completed,
            Status::Failed,
            Status::Error,
            Status::Healthy,
        ] {
            let wire = serde_json::to_string(&status).unwrap();
            assert_eq!(wire, format!("\"{}\"", status.as_str()));
            let back: Status = serde_json::from_str(&wire).unwrap();
            assert_eq!(back, status);
        }
    }

    #[test]
    fn test_deserialize_defaults() {
        let env: Envelope =
            serde_json::from_str(r#"{"messageId":"x","status":"healthy"}"#).unwrap();
        assert!(env.destination.is_empty());
        assert_eq!(env.data, Value::Null);
        assert!(env.reason.is_none());
    }

    #[test]
    fn test_busy_reply_shape() {
        let busy = Envelope::busy("m-2");
        assert!(busy.is_server_busy());
        assert_eq!(busy.destination, vec![SUPERVISOR_TARGET.to_string()]);
        assert_eq!(busy.message_id, "m-2");
    }

    #[test]
    fn test_ack_is_pure() {
        let ack = Envelope::ack("m-3");
        assert!(ack.is_pure_ack());
        assert!(ack.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_id() {
        let mut env = Envelope::ack("m-4");
        env.message_id.clear();
        assert!(matches!(
            env.validate(),
            Err(ProtocolError::InvalidEnvelope("empty messageId"))
        ));
    }

    #[test]
    fn test_validate_rejects_routed_heartbeat() {
        let mut beat = Envelope::healthy("DatabaseWorker-123");
        beat.destination = vec!["QueueWorker/produceMessage".to_string()];
        assert!(beat.validate().is_err());
    }

    #[test]
    fn test_single_destination_copy() {
        let env = Envelope::new(
            Status::Completed,
            vec![
                "HttpWorker/onProcessedMessage".to_string(),
                "QueueWorker/produceMessage".to_string(),
            ],
            json!({"projectId": "p-1"}),
        );
        let copy = env.single_destination("QueueWorker/produceMessage");
        assert_eq!(copy.message_id, env.message_id);
        assert_eq!(copy.destination, vec!["QueueWorker/produceMessage".to_string()]);
        assert_eq!(copy.data, env.data);
    }
}
