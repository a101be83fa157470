//! The contract between the engine and the analysis tasks plugged into it.
//!
//! Actions are compute-only: they read the shared state, do their work, and
//! return a [`NodeUpdate`]. The executor owns the merge. Capabilities a node
//! needs (the inference invoker, data providers) are handed to it at
//! construction, never reached through globals, so test doubles slot in
//! without ceremony.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::state::{AgentState, Message, RUN_SCOPE};

/// Per-run context handed to a node's `execute`.
#[derive(Clone)]
pub struct NodeCtx {
    pub run_id: String,
    pub node_id: String,
    pub state: AgentState,
}

impl NodeCtx {
    pub fn new(run_id: impl Into<String>, node_id: impl Into<String>, state: AgentState) -> Self {
        Self {
            run_id: run_id.into(),
            node_id: node_id.into(),
            state,
        }
    }

    /// Read a run-level input seeded from the trigger request.
    pub fn run_input<T: DeserializeOwned>(&self, field: &str) -> anyhow::Result<T> {
        self.state.get_data(RUN_SCOPE, field)
    }
}

/// A node's contribution to the shared state, applied as one atomic merge
/// keyed by the node's name.
#[derive(Debug, Default)]
pub struct NodeUpdate {
    pub messages: Vec<Message>,
    pub data: Vec<(String, Value)>,
}

impl NodeUpdate {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, sender: impl Into<String>, content: impl Into<String>) -> Self {
        self.messages.push(Message::new(sender, content));
        self
    }

    pub fn with_data(mut self, field: impl Into<String>, value: Value) -> Self {
        self.data.push((field.into(), value));
        self
    }
}

/// One unit of work in the flow.
///
/// Implementations must not assume any ordering among siblings: two nodes
/// without a dependency relationship may run in the same time window, in
/// either order, or truly in parallel.
#[async_trait]
pub trait NodeAction: Send + Sync {
    /// Unique name of the node. Doubles as its write scope in the shared
    /// state and as the identity edges are declared against.
    fn name(&self) -> &str;

    /// Compute this node's contribution.
    ///
    /// An `Err` is fatal for the run unless it is an
    /// [`InvocationError`](crate::error::InvocationError) the node chose to
    /// propagate; nodes that can degrade gracefully should catch invoker
    /// failures and return a substitute update instead.
    async fn execute(&self, ctx: &NodeCtx) -> anyhow::Result<NodeUpdate>;
}
