use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event emitted while a run progresses.
///
/// Delivered over the executor's optional event channel for audit and
/// telemetry; dropping the receiver never affects execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecEvent {
    NodeStarted {
        run_id: String,
        node: String,
        timestamp: DateTime<Utc>,
    },
    NodeCompleted {
        run_id: String,
        node: String,
        timestamp: DateTime<Utc>,
        duration_ms: u64,
    },
    NodeFailed {
        run_id: String,
        node: String,
        timestamp: DateTime<Utc>,
        error: String,
    },
}

impl ExecEvent {
    pub fn node(&self) -> &str {
        match self {
            Self::NodeStarted { node, .. }
            | Self::NodeCompleted { node, .. }
            | Self::NodeFailed { node, .. } => node,
        }
    }
}
