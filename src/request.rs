//! The run trigger: what a caller supplies to start a decision run, date
//! defaulting, validation, and seeding of the initial shared state.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::EngineError;
use crate::state::{AgentState, Message, RUN_SCOPE, SHOW_REASONING};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A run trigger as received from the caller.
///
/// Optional fields carry the same defaults the service contract documents:
/// start 15 days before today, end 1 day before today, 100k cash, flat
/// position, 5 reference items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub ticker: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default = "default_capital")]
    pub initial_capital: f64,
    #[serde(default)]
    pub initial_position: u32,
    #[serde(default = "default_num_of_news")]
    pub num_of_news: u32,
    #[serde(default)]
    pub show_reasoning: bool,
}

fn default_capital() -> f64 {
    100_000.0
}

fn default_num_of_news() -> u32 {
    5
}

impl RunRequest {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            start_date: None,
            end_date: None,
            initial_capital: default_capital(),
            initial_position: 0,
            num_of_news: default_num_of_news(),
            show_reasoning: false,
        }
    }

    /// Validate the trigger and fill in defaulted dates relative to `today`.
    ///
    /// Fails before any node could run; a rejected request never starts a
    /// flow.
    pub fn resolve(&self, today: NaiveDate) -> Result<ResolvedRequest, EngineError> {
        if self.ticker.trim().is_empty() {
            return Err(EngineError::Validation("ticker must not be empty".into()));
        }
        if self.initial_capital < 0.0 {
            return Err(EngineError::Validation(format!(
                "initial_capital must be >= 0, got {}",
                self.initial_capital
            )));
        }
        if !(1..=100).contains(&self.num_of_news) {
            return Err(EngineError::Validation(format!(
                "num_of_news must be within [1, 100], got {}",
                self.num_of_news
            )));
        }

        let start_date = match &self.start_date {
            Some(raw) => parse_date("start_date", raw)?,
            None => today
                .checked_sub_days(Days::new(15))
                .ok_or_else(|| EngineError::Validation("start_date out of range".into()))?,
        };
        let end_date = match &self.end_date {
            Some(raw) => parse_date("end_date", raw)?,
            None => today
                .checked_sub_days(Days::new(1))
                .ok_or_else(|| EngineError::Validation("end_date out of range".into()))?,
        };
        if start_date > end_date {
            return Err(EngineError::Validation(format!(
                "start date {start_date} cannot be after end date {end_date}"
            )));
        }

        Ok(ResolvedRequest {
            ticker: self.ticker.clone(),
            start_date,
            end_date,
            initial_capital: self.initial_capital,
            initial_position: self.initial_position,
            num_of_news: self.num_of_news,
            show_reasoning: self.show_reasoning,
        })
    }
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| {
        EngineError::Validation(format!("{field} '{raw}' is not a valid YYYY-MM-DD date: {e}"))
    })
}

/// A validated trigger with every field materialized.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRequest {
    pub ticker: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub initial_position: u32,
    pub num_of_news: u32,
    pub show_reasoning: bool,
}

impl ResolvedRequest {
    /// Build the initial shared state for this run: the kickoff message plus
    /// the run-scope inputs every analysis node reads.
    pub fn seed_state(&self) -> AgentState {
        let state = AgentState::new();
        state.append_message(Message::new(
            "human",
            "Make a trading decision based on the provided data.",
        ));
        state.insert_data(RUN_SCOPE, "ticker", json!(self.ticker));
        state.insert_data(
            RUN_SCOPE,
            "start_date",
            json!(self.start_date.format(DATE_FORMAT).to_string()),
        );
        state.insert_data(
            RUN_SCOPE,
            "end_date",
            json!(self.end_date.format(DATE_FORMAT).to_string()),
        );
        state.insert_data(
            RUN_SCOPE,
            "portfolio",
            json!({
                "cash": self.initial_capital,
                "stock": self.initial_position,
            }),
        );
        state.insert_data(RUN_SCOPE, "num_of_news", json!(self.num_of_news));
        state.set_metadata(SHOW_REASONING, json!(self.show_reasoning));
        state
    }
}
