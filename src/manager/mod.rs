// Strategy manager module
//
// Two managers share the same strategy registry but combine signals
// differently: `StrategyManager` weights every vote and vetoes on weak
// consensus, `AdaptiveStrategyManager` walks a per-regime priority list
// and lets secondary strategies confirm or veto the front-runner.
pub mod adaptive;
pub mod base;

pub use adaptive::{AdaptiveCombinerConfig, AdaptiveStrategyManager};
pub use base::{CombinerConfig, StrategyManager};

use crate::models::{Portfolio, TradingSignal};
use crate::strategy::Strategy;
use serde_json::Value;
use std::collections::HashMap;

/// Common surface over both managers so backtests and callers can swap
/// combination engines without caring which one they hold
pub trait DecisionEngine: Send {
    /// Evaluate one tick; always returns a well-formed signal
    fn get_combined_signal(
        &mut self,
        market: &Value,
        indicators: &Value,
        portfolio: &Portfolio,
    ) -> TradingSignal;

    /// Stable label of the last classified regime
    fn regime_label(&self) -> &'static str;

    /// Engine name for reports
    fn engine_name(&self) -> &'static str;
}

/// Run every registered strategy, collecting a name -> signal map.
/// Strategies are total functions; a misbehaving one degrades only its own
/// entry, never the tick.
pub(crate) fn run_strategies(
    strategies: &[Box<dyn Strategy>],
    market: &Value,
    indicators: &Value,
    portfolio: &Portfolio,
) -> HashMap<String, TradingSignal> {
    strategies
        .iter()
        .map(|strategy| {
            let signal = strategy.analyze(market, indicators, portfolio);
            tracing::debug!(
                "{}: {} @{:.0} ({})",
                strategy.name(),
                signal.action,
                signal.confidence,
                signal.reasoning
            );
            (strategy.name().to_string(), signal)
        })
        .collect()
}
