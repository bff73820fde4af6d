// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reference worker handler tables.
//!
//! The database worker backs onto an in-memory project store; the HTTP,
//! queue, and GraphQL tables are the thin continuation ends of the routing
//! chain (the real front-ends embed the same runtime and register richer
//! handlers over their own clients).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use overseer_protocol::REASON_NO_DATA;

use crate::handlers::{HandlerTable, Reply, reply_destinations};

/// In-memory project document store keyed by `_id`.
#[derive(Default)]
pub struct ProjectStore {
    documents: Mutex<HashMap<String, Value>>,
}

impl ProjectStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document, assigning an `_id` when the caller did not.
    /// Returns the stored document.
    pub async fn insert(&self, mut document: Value) -> Value {
        if !document.is_object() {
            document = json!({ "value": document });
        }
        let id = document
            .get("_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        document["_id"] = json!(id);

        self.documents.lock().await.insert(id, document.clone());
        document
    }

    /// Fetch a document by id.
    pub async fn get(&self, id: &str) -> Option<Value> {
        self.documents.lock().await.get(id).cloned()
    }

    /// All documents, in no particular order.
    pub async fn all(&self) -> Vec<Value> {
        self.documents.lock().await.values().cloned().collect()
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.documents.lock().await.len()
    }
}

/// Handler table of the database worker.
pub fn database_handlers(store: Arc<ProjectStore>) -> HandlerTable {
    let mut table = HandlerTable::new();

    let create_store = store.clone();
    table.register("createNewData", move |_arg, envelope| {
        let store = create_store.clone();
        async move {
            let next_hops = reply_destinations(&envelope);
            let mut document = envelope.data;
            // routing metadata is not part of the document
            if let Some(obj) = document.as_object_mut() {
                obj.remove("replyTo");
            }
            let stored = store.insert(document).await;
            info!(id = %stored["_id"], "Document created");
            Reply::completed(
                json!({"insertedId": stored["_id"], "document": stored}),
                next_hops,
            )
        }
    });

    let get_store = store.clone();
    table.register("getDataById", move |arg, envelope| {
        let store = get_store.clone();
        async move {
            let next_hops = reply_destinations(&envelope);
            let Some(id) = arg else {
                return Reply::failed(REASON_NO_DATA).with_destination(next_hops);
            };
            match store.get(&id).await {
                Some(document) => Reply::completed(document, next_hops),
                None => Reply::failed(REASON_NO_DATA).with_destination(next_hops),
            }
        }
    });

    table.register("getData", move |_arg, envelope| {
        let store = store.clone();
        async move { Reply::completed(json!(store.all().await), reply_destinations(&envelope)) }
    });

    table
}

/// Handler table of the HTTP front-end worker.
pub fn http_handlers() -> HandlerTable {
    let mut table = HandlerTable::new();
    table.register("onProcessedMessage", |_arg, envelope| async move {
        info!(message_id = %envelope.message_id, "Processed message received");
        Reply::completed(envelope.data, Vec::new())
    });
    table
}

/// Handler table of the queue worker.
pub fn queue_handlers() -> HandlerTable {
    let mut table = HandlerTable::new();
    table.register("produceMessage", |_arg, envelope| async move {
        info!(
            message_id = %envelope.message_id,
            payload = %envelope.data,
            "Publishing message downstream"
        );
        Reply::completed(Value::Null, Vec::new())
    });
    table
}

/// Handler table of the GraphQL front-end worker.
pub fn graphql_handlers() -> HandlerTable {
    let mut table = HandlerTable::new();
    table.register("onProcessedMessage", |_arg, envelope| async move {
        info!(message_id = %envelope.message_id, "Processed message received");
        Reply::completed(envelope.data, Vec::new())
    });
    table
}
