//! The canonical decision pipeline: market data fans out to four independent
//! analysts, their signals converge on risk management, and portfolio
//! management produces the terminal decision.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::decision::{extract_decision, Decision};
use crate::error::{EngineError, GraphError};
use crate::flow::{Executor, Flow};
use crate::node::NodeAction;
use crate::request::RunRequest;

/// The seven roles of the decision graph. The engine wires edges against
/// each action's declared name, so implementations are free to name
/// themselves; only the shape is fixed.
pub struct PipelineActions {
    pub market_data: Arc<dyn NodeAction>,
    pub technicals: Arc<dyn NodeAction>,
    pub fundamentals: Arc<dyn NodeAction>,
    pub sentiment: Arc<dyn NodeAction>,
    pub valuation: Arc<dyn NodeAction>,
    pub risk: Arc<dyn NodeAction>,
    pub portfolio: Arc<dyn NodeAction>,
}

/// Compile the canonical flow from the supplied role implementations.
pub fn decision_flow(actions: PipelineActions) -> Result<Flow, GraphError> {
    let market = actions.market_data.name().to_string();
    let technicals = actions.technicals.name().to_string();
    let fundamentals = actions.fundamentals.name().to_string();
    let sentiment = actions.sentiment.name().to_string();
    let valuation = actions.valuation.name().to_string();
    let risk = actions.risk.name().to_string();
    let portfolio = actions.portfolio.name().to_string();

    Flow::builder("trading_decision")
        .node(actions.market_data)
        .node(actions.technicals)
        .node(actions.fundamentals)
        .node(actions.sentiment)
        .node(actions.valuation)
        .node(actions.risk)
        .node(actions.portfolio)
        .depends_on(&technicals, &market)
        .depends_on(&fundamentals, &market)
        .depends_on(&sentiment, &market)
        .depends_on(&valuation, &market)
        .depends_on_all(&risk, [&technicals, &fundamentals, &sentiment, &valuation])
        .depends_on(&portfolio, &risk)
        .build()
}

/// End-to-end run: validate the trigger, seed the state, execute the flow,
/// and parse the terminal decision.
///
/// `today` anchors the date defaulting; callers normally pass
/// `Utc::now().date_naive()`. The caller receives a complete decision or one
/// categorized error, never a partial result.
pub async fn run_decision(
    executor: &Executor,
    flow: &Flow,
    request: &RunRequest,
    today: NaiveDate,
) -> Result<Decision, EngineError> {
    let resolved = request.resolve(today)?;
    let state = resolved.seed_state();
    let final_state = executor.execute(flow, state).await?;
    Ok(extract_decision(&final_state)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeCtx, NodeUpdate};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct Stub(&'static str);

    #[async_trait]
    impl NodeAction for Stub {
        fn name(&self) -> &str {
            self.0
        }

        async fn execute(&self, _ctx: &NodeCtx) -> anyhow::Result<NodeUpdate> {
            Ok(NodeUpdate::empty())
        }
    }

    fn stub_actions() -> PipelineActions {
        PipelineActions {
            market_data: Arc::new(Stub("market_data")),
            technicals: Arc::new(Stub("technical_analyst")),
            fundamentals: Arc::new(Stub("fundamentals")),
            sentiment: Arc::new(Stub("sentiment")),
            valuation: Arc::new(Stub("valuation")),
            risk: Arc::new(Stub("risk_management")),
            portfolio: Arc::new(Stub("portfolio_management")),
        }
    }

    #[test]
    fn canonical_flow_compiles() {
        let flow = decision_flow(stub_actions()).unwrap();
        assert_eq!(flow.len(), 7);
        assert_eq!(flow.entry(), "market_data");
        assert_eq!(flow.terminals(), &["portfolio_management".to_string()]);
    }
}
