use super::{run_strategies, DecisionEngine};
use crate::llm::LlmAnalyzer;
use crate::models::{Action, Portfolio, TradingSignal};
use crate::regime::{detect_market_regime_enhanced, AdaptiveRegime};
use crate::strategy::{
    LlmStrategy, MeanReversionStrategy, MomentumStrategy, Strategy, TrendFollowingStrategy,
};
use crate::tracker::PerformanceTracker;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Confirmation/veto tunables for the hierarchical combiner. The window
/// consults exactly two secondary strategies; opinions further down the
/// priority list are treated as noise.
#[derive(Debug, Clone)]
pub struct AdaptiveCombinerConfig {
    /// Confidence added per agreeing secondary strategy
    pub confirmation_bonus: f64,

    /// Confidence removed per opposing secondary strategy
    pub veto_penalty: f64,

    /// Opposing strategies below this confidence cannot veto
    pub veto_confidence_floor: f64,

    /// How many lower-priority strategies are consulted
    pub confirmation_window: usize,

    /// Hard cap on the combined confidence
    pub max_confidence: f64,
}

impl Default for AdaptiveCombinerConfig {
    fn default() -> Self {
        Self {
            confirmation_bonus: 5.0,
            veto_penalty: 10.0,
            veto_confidence_floor: 60.0,
            confirmation_window: 2,
            max_confidence: 95.0,
        }
    }
}

/// Buy/sell confidence thresholds for one (regime, strategy) cell
#[derive(Debug, Clone, Copy)]
pub struct ActionThresholds {
    pub buy: f64,
    pub sell: f64,
}

/// Fallback used when a (regime, strategy) pair has no table entry
pub const DEFAULT_THRESHOLDS: ActionThresholds = ActionThresholds { buy: 30.0, sell: 30.0 };

/// Strategy consultation order per regime. Order is semantic: the
/// hierarchical combiner returns the first strategy that clears its
/// threshold, so earlier entries win ties outright.
fn regime_priority(regime: AdaptiveRegime) -> &'static [&'static str] {
    match regime {
        AdaptiveRegime::Trending => {
            &["trend_following", "momentum", "llm_strategy", "mean_reversion"]
        }
        AdaptiveRegime::Ranging => {
            &["mean_reversion", "llm_strategy", "trend_following", "momentum"]
        }
        AdaptiveRegime::Volatile => {
            &["llm_strategy", "mean_reversion", "momentum", "trend_following"]
        }
        AdaptiveRegime::BearRanging => {
            &["mean_reversion", "llm_strategy", "momentum", "trend_following"]
        }
    }
}

/// Per-regime confidence thresholds. Strategies out of their element need
/// much more conviction to act; pairs missing here fall back to
/// DEFAULT_THRESHOLDS through the explicit two-level lookup in
/// `thresholds_for`.
fn adaptive_threshold(regime: AdaptiveRegime, strategy: &str) -> Option<ActionThresholds> {
    let cell = match (regime, strategy) {
        (AdaptiveRegime::Trending, "trend_following") => ActionThresholds { buy: 30.0, sell: 35.0 },
        (AdaptiveRegime::Trending, "momentum") => ActionThresholds { buy: 35.0, sell: 40.0 },
        (AdaptiveRegime::Trending, "llm_strategy") => ActionThresholds { buy: 45.0, sell: 45.0 },
        (AdaptiveRegime::Trending, "mean_reversion") => ActionThresholds { buy: 60.0, sell: 55.0 },

        (AdaptiveRegime::Ranging, "mean_reversion") => ActionThresholds { buy: 35.0, sell: 35.0 },
        (AdaptiveRegime::Ranging, "llm_strategy") => ActionThresholds { buy: 45.0, sell: 45.0 },
        (AdaptiveRegime::Ranging, "trend_following") => ActionThresholds { buy: 55.0, sell: 55.0 },

        (AdaptiveRegime::Volatile, "llm_strategy") => ActionThresholds { buy: 50.0, sell: 50.0 },
        (AdaptiveRegime::Volatile, "mean_reversion") => ActionThresholds { buy: 45.0, sell: 40.0 },
        (AdaptiveRegime::Volatile, "momentum") => ActionThresholds { buy: 50.0, sell: 50.0 },

        (AdaptiveRegime::BearRanging, "mean_reversion") => {
            ActionThresholds { buy: 40.0, sell: 35.0 }
        }
        (AdaptiveRegime::BearRanging, "llm_strategy") => ActionThresholds { buy: 50.0, sell: 45.0 },
        (AdaptiveRegime::BearRanging, "momentum") => ActionThresholds { buy: 60.0, sell: 50.0 },

        _ => return None,
    };
    Some(cell)
}

/// Explicit two-level lookup: exact cell, then the named default
fn thresholds_for(regime: AdaptiveRegime, strategy: &str) -> ActionThresholds {
    adaptive_threshold(regime, strategy).unwrap_or(DEFAULT_THRESHOLDS)
}

/// Multi-strategy manager with hierarchical regime-priority combination.
///
/// Instead of weighting votes, the adaptive manager trusts the strategy
/// best suited to the detected regime, after letting the next two
/// strategies in line confirm or veto it.
pub struct AdaptiveStrategyManager {
    product_id: String,
    strategies: Vec<Box<dyn Strategy>>,
    current_regime: AdaptiveRegime,
    tracker: Option<Arc<dyn PerformanceTracker>>,
    config: AdaptiveCombinerConfig,
}

impl AdaptiveStrategyManager {
    /// Rule-based strategies only
    pub fn new(product_id: impl Into<String>) -> Self {
        let strategies: Vec<Box<dyn Strategy>> = vec![
            Box::new(TrendFollowingStrategy::default()),
            Box::new(MeanReversionStrategy::default()),
            Box::new(MomentumStrategy::default()),
        ];
        Self::from_parts(product_id.into(), strategies)
    }

    /// Rule-based strategies plus the LLM strategy
    pub fn with_llm(product_id: impl Into<String>, analyzer: Arc<dyn LlmAnalyzer>) -> Self {
        let product_id = product_id.into();
        let strategies: Vec<Box<dyn Strategy>> = vec![
            Box::new(TrendFollowingStrategy::default()),
            Box::new(MeanReversionStrategy::default()),
            Box::new(MomentumStrategy::default()),
            Box::new(LlmStrategy::new(analyzer, product_id.clone())),
        ];
        Self::from_parts(product_id, strategies)
    }

    fn from_parts(product_id: String, strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self {
            product_id,
            strategies,
            current_regime: AdaptiveRegime::Ranging,
            tracker: None,
            config: AdaptiveCombinerConfig::default(),
        }
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn PerformanceTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_combiner_config(mut self, config: AdaptiveCombinerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn analyze_all_strategies(
        &self,
        market: &Value,
        indicators: &Value,
        portfolio: &Portfolio,
    ) -> HashMap<String, TradingSignal> {
        run_strategies(&self.strategies, market, indicators, portfolio)
    }

    pub fn get_current_market_regime(&self) -> AdaptiveRegime {
        self.current_regime
    }

    pub fn get_strategy_performance(&self) -> Value {
        json!({
            "product_id": self.product_id,
            "current_regime": self.current_regime.as_str(),
            "priority": regime_priority(self.current_regime),
        })
    }

    /// Walk the regime's priority list; first strategy whose confidence
    /// survives its threshold and the confirmation/veto pass wins. If
    /// nobody passes, HOLD at the unweighted average confidence.
    fn combine_hierarchical(
        &self,
        regime: AdaptiveRegime,
        signals: &HashMap<String, TradingSignal>,
    ) -> TradingSignal {
        let order = regime_priority(regime);
        let cfg = &self.config;

        for (position, name) in order.iter().enumerate() {
            let Some(signal) = signals.get(*name) else { continue };
            if signal.action == Action::Hold {
                continue;
            }

            let thresholds = thresholds_for(regime, name);
            let threshold = match signal.action {
                Action::Buy => thresholds.buy,
                Action::Sell => thresholds.sell,
                Action::Hold => unreachable!(),
            };
            if signal.confidence < threshold {
                continue;
            }

            // Consult the next strategies in priority order. Only two by
            // default: lower-priority opinions are treated as noise.
            let window_end = (position + 1 + cfg.confirmation_window).min(order.len());
            let mut confirmations = 0usize;
            let mut vetoes = 0usize;
            for follower in &order[position + 1..window_end] {
                let Some(peer) = signals.get(*follower) else { continue };
                if peer.action == signal.action {
                    confirmations += 1;
                } else if Some(peer.action) == signal.action.opposite()
                    && peer.confidence > cfg.veto_confidence_floor
                {
                    vetoes += 1;
                }
            }

            let final_confidence = (signal.confidence
                + confirmations as f64 * cfg.confirmation_bonus
                - vetoes as f64 * cfg.veto_penalty)
                .clamp(0.0, cfg.max_confidence);

            if final_confidence < threshold {
                tracing::debug!(
                    "{} passed its {} threshold but was vetoed down to {:.0}",
                    name,
                    regime.as_str(),
                    final_confidence
                );
                continue;
            }

            let mut reasoning = format!(
                "Regime {}: {} {} at {:.0} (threshold {:.0})",
                regime.as_str(),
                name,
                signal.action,
                signal.confidence,
                threshold
            );
            if confirmations > 0 {
                reasoning.push_str(&format!(
                    "; Confirmed by secondary strategies (+{:.0})",
                    confirmations as f64 * cfg.confirmation_bonus
                ));
            }
            if vetoes > 0 {
                reasoning.push_str(&format!(
                    "; opposed by {} secondary strategies (-{:.0})",
                    vetoes,
                    vetoes as f64 * cfg.veto_penalty
                ));
            }
            reasoning.push_str(&format!(". {}", signal.reasoning));

            return TradingSignal::new(signal.action, final_confidence, reasoning)
                .with_multiplier(signal.position_size_multiplier.clamp(0.5, 2.0))
                .with_source(*name);
        }

        let average = if signals.is_empty() {
            0.0
        } else {
            signals.values().map(|s| s.confidence).sum::<f64>() / signals.len() as f64
        };
        TradingSignal::hold(
            average.clamp(0.0, 100.0),
            format!(
                "No strategy met its {} threshold; holding at average confidence of {} strategies",
                regime.as_str(),
                signals.len()
            ),
        )
    }

    /// One evaluation tick: validate, fan out, classify, combine, record
    pub fn get_combined_signal(
        &mut self,
        market: &Value,
        indicators: &Value,
        portfolio: &Portfolio,
    ) -> TradingSignal {
        let Some(market_obj) = market.as_object() else {
            return TradingSignal::hold(0.0, "Invalid market data format");
        };
        if !indicators.is_object() {
            return TradingSignal::hold(0.0, "Invalid technical indicators format");
        }

        let signals = self.analyze_all_strategies(market, indicators, portfolio);

        self.current_regime = detect_market_regime_enhanced(indicators, market);

        let combined = self.combine_hierarchical(self.current_regime, &signals);

        self.record(&signals, &combined, market_obj);

        combined
    }

    fn record(
        &self,
        signals: &HashMap<String, TradingSignal>,
        combined: &TradingSignal,
        market: &Map<String, Value>,
    ) {
        let Some(tracker) = &self.tracker else { return };

        let price = market.get("price").and_then(Value::as_f64).unwrap_or(0.0);
        if let Err(e) = tracker.record_decision(&self.product_id, signals, combined, price) {
            tracing::warn!("performance tracker failed, continuing: {}", e);
        }
    }
}

impl DecisionEngine for AdaptiveStrategyManager {
    fn get_combined_signal(
        &mut self,
        market: &Value,
        indicators: &Value,
        portfolio: &Portfolio,
    ) -> TradingSignal {
        AdaptiveStrategyManager::get_combined_signal(self, market, indicators, portfolio)
    }

    fn regime_label(&self) -> &'static str {
        self.current_regime.as_str()
    }

    fn engine_name(&self) -> &'static str {
        "adaptive"
    }
}
