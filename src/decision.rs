//! Parses the terminal node's contribution into the externally visible
//! decision shape.
//!
//! The upstream service frames its JSON payload in a Markdown code fence with
//! an optional `json` language tag; the framing is part of the documented
//! collaborator contract, so the unwrap recognizes the markers instead of
//! trimming fixed offsets, and bare JSON passes through untouched.

use serde::{Deserialize, Serialize};

use crate::error::FormatError;
use crate::state::AgentState;

/// Direction of the final trading decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

/// One analyst's vote as echoed back by the aggregation stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSignal {
    #[serde(alias = "agent_name")]
    pub agent: String,
    pub signal: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// The structured decision returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub action: TradeAction,
    pub quantity: u32,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub agent_signals: Vec<AgentSignal>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Locate the terminal contribution in the final state and parse it.
///
/// Terminals complete last, so the payload is the newest entry in the
/// message log. A missing or unparseable payload is a contract violation by
/// the terminal node, surfaced as [`FormatError`] rather than an execution
/// failure.
pub fn extract_decision(state: &AgentState) -> Result<Decision, FormatError> {
    let message = state.last_message().ok_or(FormatError::MissingPayload)?;
    parse_decision(&message.content)
}

/// Parse a raw terminal payload, unwrapping fence framing when present.
pub fn parse_decision(raw: &str) -> Result<Decision, FormatError> {
    serde_json::from_str(unwrap_payload(raw)).map_err(|source| FormatError::Unparseable { source })
}

fn unwrap_payload(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    match rest.strip_suffix("```") {
        Some(body) => body.trim(),
        // Unterminated fence: leave it to the parser to reject.
        None => trimmed,
    }
}
