use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trading action decided for one evaluation tick
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        }
    }

    /// Opposite action for veto checks. HOLD has no opposite.
    pub fn opposite(&self) -> Option<Action> {
        match self {
            Action::Buy => Some(Action::Sell),
            Action::Sell => Some(Action::Buy),
            Action::Hold => None,
        }
    }

    /// Parse an externally supplied action string (LLM output, config files).
    /// Case-insensitive; anything unrecognized is rejected.
    pub fn parse(s: &str) -> Option<Action> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Some(Action::Buy),
            "SELL" => Some(Action::Sell),
            "HOLD" => Some(Action::Hold),
            _ => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single strategy (or combined) trading signal.
///
/// `confidence` is nominally 0-100 but individual producers may transiently
/// exceed the range; combiners clamp before returning. `source_strategy`
/// carries the producing strategy's registry key so reporting never has to
/// re-derive it from the reasoning text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSignal {
    pub action: Action,
    pub confidence: f64,
    pub reasoning: String,
    pub position_size_multiplier: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub source_strategy: Option<String>,
}

impl TradingSignal {
    pub fn new(action: Action, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            action,
            confidence,
            reasoning: reasoning.into(),
            position_size_multiplier: 1.0,
            stop_loss: None,
            take_profit: None,
            source_strategy: None,
        }
    }

    /// Convenience for the recovery HOLD paths
    pub fn hold(confidence: f64, reasoning: impl Into<String>) -> Self {
        Self::new(Action::Hold, confidence, reasoning)
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.position_size_multiplier = multiplier;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_strategy = Some(source.into());
        self
    }
}

/// OHLCV candlestick data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub token: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Portfolio snapshot handed to strategies alongside market data.
/// Current rules do not condition on it, but the interface keeps room for
/// position-aware strategies without another signature change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: f64,
    pub quantity: f64,
    pub entry_price: Option<f64>,
}

/// Typed market summary handed to the LLM analyzer boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketContext {
    pub product_id: String,
    pub current_price: f64,
    pub price_change_24h: f64,
    pub price_change_7d: f64,
    pub rsi: f64,
    pub macd_histogram: f64,
    pub bb_width_pct: f64,
    pub volume_ratio: f64,
}

/// Raw decision returned by an LLM analyzer. The decision string is
/// validated by the consuming strategy, never trusted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmDecision {
    pub decision: String,
    pub confidence: f64,
    pub reasoning: String,
}

/// News sentiment summary for one asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsSentiment {
    /// Aggregate sentiment in [-1, 1]
    pub overall_sentiment: f64,
    pub sentiment_category: String,
    /// Analyzer's own confidence in [0, 1]
    pub confidence: f64,
    pub article_count: u32,
}
