//! quantflow - a concurrent decision-pipeline orchestration engine.
//!
//! The crate compiles a declared set of analysis tasks and their dependency
//! edges into an immutable flow, executes ready tasks concurrently over a
//! shared run state, and parses the terminal task's contribution into a
//! structured trading decision. External inference calls go through a
//! retrying invoker with exponential backoff.

pub mod decision;
pub mod error;
pub mod flow;
pub mod llm;
pub mod node;
pub mod pipeline;
pub mod request;
pub mod state;

// Re-exports for convenience
pub use decision::{extract_decision, parse_decision, AgentSignal, Decision, TradeAction};
pub use error::{EngineError, FormatError, GraphError, InvocationError};
pub use flow::{ExecEvent, Executor, ExecutorConfig, Flow, FlowBuilder};
pub use llm::{ChatMessage, CompletionClient, CompletionRequest, Invoker, RetryPolicy, Role};
pub use node::{NodeAction, NodeCtx, NodeUpdate};
pub use request::{ResolvedRequest, RunRequest};
pub use state::{AgentState, Message};
