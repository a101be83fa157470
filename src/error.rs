use std::time::Duration;

use thiserror::Error;

/// Errors raised while compiling a flow declaration into an executable graph.
///
/// These are build-time failures: a flow that compiles never produces one of
/// these during a run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("node '{0}' is declared more than once")]
    DuplicateNode(String),

    #[error("node '{node}' depends on undeclared node '{dependency}'")]
    UndeclaredDependency { node: String, dependency: String },

    #[error("flow '{0}' contains no nodes")]
    Empty(String),

    #[error("flow '{0}' contains a dependency cycle")]
    Cycle(String),

    #[error("flow '{0}' has no entry node: every node has at least one predecessor")]
    NoEntry(String),

    #[error("flow '{flow}' has more than one entry node: {nodes:?}")]
    MultipleEntries { flow: String, nodes: Vec<String> },
}

/// The external inference call exhausted its retry budget.
///
/// Recoverable at the node level: a node may substitute a degraded update, or
/// propagate this to fail the run.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("inference call failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error(
        "inference call abandoned after {attempts} attempts: {elapsed:?} exceeds the retry time budget: {last_error}"
    )]
    BudgetExhausted {
        attempts: u32,
        elapsed: Duration,
        last_error: String,
    },
}

impl InvocationError {
    /// How many attempts were actually made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::BudgetExhausted { attempts, .. } => *attempts,
        }
    }
}

/// The terminal node's payload violated the response contract.
///
/// Distinct from [`EngineError::Execution`]: the graph ran to completion, but
/// what the terminal node produced is not a parseable decision.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("terminal node produced no message payload")]
    MissingPayload,

    #[error("terminal payload is not a valid decision after unwrapping: {source}")]
    Unparseable {
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level error surfaced to the caller of a run.
///
/// A caller always receives either a complete decision or exactly one of
/// these; never a partially filled result.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("node '{node}' failed: {message}")]
    Execution { node: String, message: String },

    #[error(transparent)]
    Invocation(#[from] InvocationError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("run exceeded its time budget after {elapsed:?}")]
    Timeout { elapsed: Duration },
}
