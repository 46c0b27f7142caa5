// Trading strategy module
pub mod llm_strategy;
pub mod mean_reversion;
pub mod momentum;
pub mod trend_following;

pub use llm_strategy::LlmStrategy;
pub use mean_reversion::MeanReversionStrategy;
pub use momentum::MomentumStrategy;
pub use trend_following::TrendFollowingStrategy;

use crate::models::{Portfolio, TradingSignal};
use crate::regime::MarketRegime;
use serde_json::{Map, Value};

/// Base trait for all trading strategies.
///
/// `analyze` is total: it validates its loosely-typed inputs and converts
/// every internal failure into a HOLD signal rather than returning an error
/// or panicking. One malformed payload from the upstream indicator pipeline
/// must never take down an evaluation tick.
pub trait Strategy: Send + Sync {
    /// Generate a trading signal from one evaluation tick's inputs
    fn analyze(&self, market: &Value, indicators: &Value, portfolio: &Portfolio) -> TradingSignal;

    /// Registry key for this strategy (stable, used in weight tables and
    /// priority lists)
    fn name(&self) -> &'static str;

    /// How well suited this strategy is to a market regime, in [0, 1]
    fn regime_suitability(&self, regime: MarketRegime) -> f64;
}

/// Reasoning string for non-mapping indicator payloads, shared by all
/// strategies so the rejection path is greppable in logs.
pub(crate) const INVALID_INDICATORS: &str = "Invalid technical indicators format";

/// Extract a finite numeric field from a payload object
pub(crate) fn field(map: &Map<String, Value>, key: &str) -> Option<f64> {
    map.get(key).and_then(Value::as_f64).filter(|v| v.is_finite())
}

/// Like `field`, but an error when absent: the caller's rule cannot run
/// without it
pub(crate) fn require(map: &Map<String, Value>, key: &str) -> crate::Result<f64> {
    field(map, key).ok_or_else(|| format!("missing or non-numeric field '{}'", key).into())
}

/// Percent price change for a named window ("1h", "24h", ...) from the
/// market payload's `price_changes` object; 0.0 when absent (pipeline
/// still warming up).
pub(crate) fn price_change(market: &Map<String, Value>, window: &str) -> f64 {
    market
        .get("price_changes")
        .and_then(Value::as_object)
        .and_then(|changes| field(changes, window))
        .unwrap_or(0.0)
}
