//! Ready-set scheduler: every node whose predecessors have completed is
//! spawned onto the runtime, a semaphore bounds how many compute at once, and
//! completions drain through one channel so state merges are serialized.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, InvocationError};
use crate::flow::events::ExecEvent;
use crate::flow::Flow;
use crate::node::{NodeAction, NodeCtx, NodeUpdate};
use crate::state::AgentState;

/// Execution settings shared by every run of this executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound on nodes computing at the same time.
    pub max_parallel_nodes: usize,
    /// Wall-clock budget for one run; `None` disables the deadline.
    pub run_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 4,
            run_timeout: Some(Duration::from_secs(3600)),
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_parallel_nodes == 0 {
            return Err(EngineError::Validation(
                "max_parallel_nodes must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

struct NodeOutcome {
    node: String,
    elapsed: Duration,
    result: anyhow::Result<NodeUpdate>,
}

/// Walks a compiled [`Flow`] against one [`AgentState`].
///
/// The executor owns the state for the lifetime of the run: nodes receive
/// clones of the same Arc-backed record, and their updates are merged one at
/// a time in the drain loop. A run either returns the fully merged final
/// state or a single categorized error; in-flight work is aborted on the
/// first fatal failure and nothing partial escapes.
pub struct Executor {
    config: ExecutorConfig,
    event_tx: Option<mpsc::UnboundedSender<ExecEvent>>,
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            event_tx: None,
        }
    }

    /// Attach a channel receiving [`ExecEvent`]s for audit/telemetry.
    pub fn with_event_channel(mut self, tx: mpsc::UnboundedSender<ExecEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn emit(&self, event: ExecEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Run the flow to completion.
    pub async fn execute(&self, flow: &Flow, state: AgentState) -> Result<AgentState, EngineError> {
        self.config.validate()?;

        let run_id = cuid2::create_id();
        let started = Instant::now();
        let deadline = self.config.run_timeout.map(|budget| started + budget);
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_nodes));
        let (tx, mut rx) = mpsc::unbounded_channel::<NodeOutcome>();

        let mut completed: HashSet<String> = HashSet::new();
        let mut launched: HashSet<String> = HashSet::new();
        let mut running: HashMap<String, JoinHandle<()>> = HashMap::new();

        info!(
            run_id = %run_id,
            flow = flow.name(),
            nodes = flow.len(),
            max_parallel = self.config.max_parallel_nodes,
            "starting flow run"
        );

        loop {
            for (node_id, action) in flow.ready_nodes(&completed, &launched) {
                debug!(run_id = %run_id, node = %node_id, "node ready");
                launched.insert(node_id.clone());
                let handle = self.spawn_node(
                    run_id.clone(),
                    node_id.clone(),
                    action,
                    state.clone(),
                    semaphore.clone(),
                    tx.clone(),
                );
                running.insert(node_id, handle);
            }

            if running.is_empty() {
                break;
            }

            let outcome = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, rx.recv()).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        abort_all(&mut running);
                        let elapsed = started.elapsed();
                        error!(
                            run_id = %run_id,
                            flow = flow.name(),
                            elapsed_ms = elapsed.as_millis() as u64,
                            "run exceeded its time budget"
                        );
                        return Err(EngineError::Timeout { elapsed });
                    }
                },
                None => rx.recv().await,
            };
            // The loop holds the original sender, so the channel cannot close
            // while nodes are still running.
            let Some(outcome) = outcome else { break };

            running.remove(&outcome.node);
            match outcome.result {
                Ok(update) => {
                    state.apply(&outcome.node, update);
                    completed.insert(outcome.node.clone());
                    info!(
                        run_id = %run_id,
                        node = %outcome.node,
                        elapsed_ms = outcome.elapsed.as_millis() as u64,
                        "node completed"
                    );
                    self.emit(ExecEvent::NodeCompleted {
                        run_id: run_id.clone(),
                        node: outcome.node,
                        timestamp: Utc::now(),
                        duration_ms: outcome.elapsed.as_millis() as u64,
                    });
                }
                Err(err) => {
                    abort_all(&mut running);
                    let message = format!("{err:#}");
                    error!(run_id = %run_id, node = %outcome.node, error = %message, "node failed, aborting run");
                    self.emit(ExecEvent::NodeFailed {
                        run_id: run_id.clone(),
                        node: outcome.node.clone(),
                        timestamp: Utc::now(),
                        error: message.clone(),
                    });
                    // Preserve the invocation category when the node chose to
                    // propagate an exhausted inference call.
                    return Err(match err.downcast::<InvocationError>() {
                        Ok(invocation) => EngineError::Invocation(invocation),
                        Err(_) => EngineError::Execution {
                            node: outcome.node,
                            message,
                        },
                    });
                }
            }
        }

        info!(
            run_id = %run_id,
            flow = flow.name(),
            completed = completed.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "flow run finished"
        );
        Ok(state)
    }

    fn spawn_node(
        &self,
        run_id: String,
        node_id: String,
        action: Arc<dyn NodeAction>,
        state: AgentState,
        semaphore: Arc<Semaphore>,
        tx: mpsc::UnboundedSender<NodeOutcome>,
    ) -> JoinHandle<()> {
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            if let Some(tx) = &event_tx {
                let _ = tx.send(ExecEvent::NodeStarted {
                    run_id: run_id.clone(),
                    node: node_id.clone(),
                    timestamp: Utc::now(),
                });
            }
            debug!(run_id = %run_id, node = %node_id, "node started");

            let ctx = NodeCtx::new(run_id, node_id.clone(), state);
            let node_started = Instant::now();
            let result = std::panic::AssertUnwindSafe(action.execute(&ctx))
                .catch_unwind()
                .await;
            let result = match result {
                Ok(inner) => inner,
                Err(panic) => {
                    warn!(node = %node_id, "node panicked");
                    Err(anyhow::anyhow!("node panicked: {}", panic_message(&panic)))
                }
            };
            let _ = tx.send(NodeOutcome {
                node: node_id,
                elapsed: node_started.elapsed(),
                result,
            });
        })
    }
}

fn abort_all(running: &mut HashMap<String, JoinHandle<()>>) {
    for (node, handle) in running.drain() {
        debug!(node = %node, "aborting in-flight node");
        handle.abort();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
