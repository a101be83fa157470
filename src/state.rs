use std::sync::{Arc, RwLock};

use anyhow::anyhow;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::NodeUpdate;

/// Scope under which run-level inputs (ticker, date range, portfolio) are
/// seeded before any node executes.
pub const RUN_SCOPE: &str = "run";

/// Metadata flag requesting verbose intermediate reasoning from nodes.
pub const SHOW_REASONING: &str = "show_reasoning";

/// One entry in the run's ordered, append-only message log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Name of the node (or "human" for the kickoff message) that produced it.
    pub sender: String,
    pub content: String,
}

impl Message {
    pub fn new(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
        }
    }
}

/// The mutable record threaded through one run.
///
/// Cloning is cheap (all sections are Arc-backed) and every clone refers to
/// the same underlying state, so concurrently running nodes observe each
/// other's committed contributions. The data section is a nested
/// `scope -> field -> value` map; a node's writes land under its own name as
/// scope, which keeps sibling nodes from colliding however they interleave.
/// The API only appends and inserts; entries written by other nodes cannot be
/// removed or reordered.
#[derive(Debug, Default, Clone)]
pub struct AgentState {
    messages: Arc<RwLock<Vec<Message>>>,
    data: Arc<DashMap<String, DashMap<String, Value>>>,
    metadata: Arc<DashMap<String, Value>>,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one message to the log.
    pub fn append_message(&self, message: Message) {
        let mut messages = self.messages.write().unwrap_or_else(|e| e.into_inner());
        messages.push(message);
    }

    /// Snapshot of the message log in append order.
    pub fn messages(&self) -> Vec<Message> {
        self.messages
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The most recently appended message, if any.
    pub fn last_message(&self) -> Option<Message> {
        self.messages
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    /// Insert one field under the given scope.
    pub fn insert_data(&self, scope: &str, field: &str, value: Value) {
        let inner = self.data.entry(scope.to_string()).or_default();
        inner.insert(field.to_string(), value);
    }

    /// Read a field written by another node (or seeded at run start).
    ///
    /// Missing scopes and fields are errors: a node asking for a
    /// predecessor's output that is not there indicates a miswired graph.
    pub fn get_data<T: DeserializeOwned>(&self, scope: &str, field: &str) -> anyhow::Result<T> {
        let inner = self
            .data
            .get(scope)
            .ok_or_else(|| anyhow!("scope '{}' not found in shared state", scope))?;
        let value = inner
            .get(field)
            .ok_or_else(|| anyhow!("field '{}' not found in scope '{}'", field, scope))?;
        serde_json::from_value(value.clone())
            .map_err(|e| anyhow!("field '{}.{}' has unexpected shape: {}", scope, field, e))
    }

    /// Whether a scope has been written at all.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.data.contains_key(scope)
    }

    pub fn set_metadata(&self, key: &str, value: Value) {
        self.metadata.insert(key.to_string(), value);
    }

    /// Boolean metadata flag; absent keys read as false.
    pub fn metadata_flag(&self, key: &str) -> bool {
        self.metadata
            .get(key)
            .map(|v| v.as_bool().unwrap_or(false))
            .unwrap_or(false)
    }

    /// Merge one node's contribution.
    ///
    /// The message block is appended under a single lock and the data fields
    /// land under the node's own scope, so an update is never observed half
    /// applied by a concurrent reader. The executor serializes calls to this
    /// per run.
    pub fn apply(&self, node: &str, update: NodeUpdate) {
        {
            let mut messages = self.messages.write().unwrap_or_else(|e| e.into_inner());
            messages.extend(update.messages);
        }
        if !update.data.is_empty() {
            let inner = self.data.entry(node.to_string()).or_default();
            for (field, value) in update.data {
                inner.insert(field, value);
            }
        }
    }
}
