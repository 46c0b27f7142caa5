use super::{run_strategies, DecisionEngine};
use crate::llm::LlmAnalyzer;
use crate::models::{Action, Portfolio, TradingSignal};
use crate::regime::{classify_regime, MarketRegime};
use crate::strategy::{
    LlmStrategy, MeanReversionStrategy, MomentumStrategy, Strategy, TrendFollowingStrategy,
};
use crate::tracker::PerformanceTracker;
use crate::volatility::VolatilityAnalyzer;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Tunables for the weighted-vote combiner. All thresholds are hand-tuned
/// against historical replays, not derived.
#[derive(Debug, Clone)]
pub struct CombinerConfig {
    /// Weighted score above which the preliminary action is BUY
    pub buy_score_threshold: f64,

    /// Weighted score below which the preliminary action is SELL
    pub sell_score_threshold: f64,

    /// |score| above this boosts confidence x1.1
    pub strong_score: f64,

    /// |score| below this reduces confidence x0.8
    pub weak_score: f64,

    /// Vote share treated as strong consensus
    pub strong_consensus: f64,

    /// Vote share below which the action is overridden to HOLD
    pub weak_consensus: f64,

    /// Confidence multiplier applied on a consensus override
    pub no_consensus_penalty: f64,
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self {
            buy_score_threshold: 0.3,
            sell_score_threshold: -0.3,
            strong_score: 0.6,
            weak_score: 0.1,
            strong_consensus: 0.6,
            weak_consensus: 0.5,
            no_consensus_penalty: 0.7,
        }
    }
}

// Floor applied before renormalizing so no strategy is ever muted entirely
const MIN_ADJUSTED_WEIGHT: f64 = 0.05;

// Scale on the (suitability - 0.5) term of the per-call adjustment
const SUITABILITY_SCALE: f64 = 0.2;

// Scale on the LLM-vs-rule confidence divergence term
const DIVERGENCE_SCALE: f64 = 0.1;

// Window handed to the volatility analyzer
const VOLATILITY_PERIODS: usize = 20;

/// Multi-strategy manager with weighted voting.
///
/// Owns the strategy registry, the externally mutable weight table and the
/// last classified regime. One instance per caller; evaluation mutates
/// only `current_regime`, and weight adjustments computed during a tick
/// never persist into the next one.
pub struct StrategyManager {
    product_id: String,
    strategies: Vec<Box<dyn Strategy>>,
    base_weights: HashMap<String, f64>,
    weights: HashMap<String, f64>,
    current_regime: MarketRegime,
    tracker: Option<Arc<dyn PerformanceTracker>>,
    volatility: Option<Arc<dyn VolatilityAnalyzer>>,
    combiner: CombinerConfig,
}

impl StrategyManager {
    /// Rule-based strategies only
    pub fn new(product_id: impl Into<String>) -> Self {
        let strategies: Vec<Box<dyn Strategy>> = vec![
            Box::new(TrendFollowingStrategy::default()),
            Box::new(MeanReversionStrategy::default()),
            Box::new(MomentumStrategy::default()),
        ];
        let base_weights = HashMap::from([
            ("trend_following".to_string(), 0.4),
            ("mean_reversion".to_string(), 0.3),
            ("momentum".to_string(), 0.3),
        ]);
        Self::from_parts(product_id.into(), strategies, base_weights)
    }

    /// Rule-based strategies plus the LLM strategy; the LLM carries the
    /// largest base weight
    pub fn with_llm(product_id: impl Into<String>, analyzer: Arc<dyn LlmAnalyzer>) -> Self {
        let product_id = product_id.into();
        let strategies: Vec<Box<dyn Strategy>> = vec![
            Box::new(TrendFollowingStrategy::default()),
            Box::new(MeanReversionStrategy::default()),
            Box::new(MomentumStrategy::default()),
            Box::new(LlmStrategy::new(analyzer, product_id.clone())),
        ];
        let base_weights = HashMap::from([
            ("trend_following".to_string(), 0.25),
            ("mean_reversion".to_string(), 0.2),
            ("momentum".to_string(), 0.2),
            ("llm_strategy".to_string(), 0.35),
        ]);
        Self::from_parts(product_id, strategies, base_weights)
    }

    fn from_parts(
        product_id: String,
        strategies: Vec<Box<dyn Strategy>>,
        base_weights: HashMap<String, f64>,
    ) -> Self {
        Self {
            product_id,
            strategies,
            weights: base_weights.clone(),
            base_weights,
            current_regime: MarketRegime::Sideways,
            tracker: None,
            volatility: None,
            combiner: CombinerConfig::default(),
        }
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn PerformanceTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_volatility_analyzer(mut self, analyzer: Arc<dyn VolatilityAnalyzer>) -> Self {
        self.volatility = Some(analyzer);
        self
    }

    pub fn with_combiner_config(mut self, config: CombinerConfig) -> Self {
        self.combiner = config;
        self
    }

    /// Run every strategy against one tick's inputs
    pub fn analyze_all_strategies(
        &self,
        market: &Value,
        indicators: &Value,
        portfolio: &Portfolio,
    ) -> HashMap<String, TradingSignal> {
        run_strategies(&self.strategies, market, indicators, portfolio)
    }

    pub fn get_current_market_regime(&self) -> MarketRegime {
        self.current_regime
    }

    pub fn strategy_weights(&self) -> &HashMap<String, f64> {
        &self.weights
    }

    /// Replace the weight table. Weights are renormalized to sum 1.0,
    /// preserving ratios; a sum that is off by more than float tolerance
    /// is logged since it usually means a caller bug.
    pub fn update_strategy_weights(&mut self, new_weights: HashMap<String, f64>) {
        let sum: f64 = new_weights.values().sum();
        if sum <= 0.0 {
            tracing::warn!("ignoring weight update with non-positive sum {}", sum);
            return;
        }

        if (sum - 1.0).abs() > 1e-6 {
            tracing::warn!("strategy weights sum to {:.4}, renormalizing to 1.0", sum);
        }

        self.weights = new_weights
            .into_iter()
            .map(|(name, weight)| (name, weight / sum))
            .collect();
    }

    /// Summary for dashboards
    pub fn get_strategy_performance(&self) -> Value {
        json!({
            "product_id": self.product_id,
            "current_regime": self.current_regime.as_str(),
            "strategy_weights": self.weights,
            "base_strategy_weights": self.base_weights,
        })
    }

    /// Per-call weight adjustment: additive deltas from regime
    /// suitability, a static per-regime bias table, LLM-vs-rule confidence
    /// divergence and the volatility analyzer, then floor + renormalize.
    /// The result is used for this tick only.
    fn adjust_weights(
        &self,
        market: &Map<String, Value>,
        regime: MarketRegime,
        signals: &HashMap<String, TradingSignal>,
    ) -> HashMap<String, f64> {
        let mut adjusted: HashMap<String, f64> = HashMap::new();

        let llm_divergence = self.llm_divergence(signals);
        let volatility_deltas = self.volatility_deltas(market);

        for strategy in &self.strategies {
            let name = strategy.name();
            let mut weight = self
                .weights
                .get(name)
                .copied()
                .unwrap_or(1.0 / self.strategies.len() as f64);

            weight += (strategy.regime_suitability(regime) - 0.5) * SUITABILITY_SCALE;
            weight += regime_bias(regime, name);

            if name == "llm_strategy" {
                weight += llm_divergence * DIVERGENCE_SCALE;
            }

            if let Some(deltas) = &volatility_deltas {
                weight += deltas.get(name).copied().unwrap_or(0.0);
            }

            adjusted.insert(name.to_string(), weight.max(MIN_ADJUSTED_WEIGHT));
        }

        let sum: f64 = adjusted.values().sum();
        for weight in adjusted.values_mut() {
            *weight /= sum;
        }

        adjusted
    }

    /// How much more (or less) confident the LLM is than the rule-based
    /// average, in [-1, 1]
    fn llm_divergence(&self, signals: &HashMap<String, TradingSignal>) -> f64 {
        let Some(llm) = signals.get("llm_strategy") else {
            return 0.0;
        };

        let rule_confidences: Vec<f64> = signals
            .iter()
            .filter(|(name, _)| name.as_str() != "llm_strategy")
            .map(|(_, signal)| signal.confidence)
            .collect();
        if rule_confidences.is_empty() {
            return 0.0;
        }

        let rule_avg = rule_confidences.iter().sum::<f64>() / rule_confidences.len() as f64;
        ((llm.confidence - rule_avg) / 100.0).clamp(-1.0, 1.0)
    }

    fn volatility_deltas(&self, market: &Map<String, Value>) -> Option<HashMap<String, f64>> {
        let analyzer = self.volatility.as_ref()?;
        let prices: Vec<f64> = market
            .get("recent_prices")?
            .as_array()?
            .iter()
            .filter_map(Value::as_f64)
            .collect();

        match analyzer.analyze(&self.product_id, &prices, VOLATILITY_PERIODS) {
            Ok(report) => {
                tracing::debug!(
                    "volatility {} ({:.2}) adjusting weights",
                    report.category,
                    report.score
                );
                Some(report.strategy_adjustments)
            }
            Err(e) => {
                tracing::warn!("volatility analyzer failed, skipping deltas: {}", e);
                None
            }
        }
    }

    /// Weighted vote over all signals with a consensus override
    fn combine_signals(
        &self,
        signals: &HashMap<String, TradingSignal>,
        weights: &HashMap<String, f64>,
    ) -> TradingSignal {
        let total_weight: f64 = signals
            .keys()
            .filter_map(|name| weights.get(name))
            .sum();
        if total_weight <= 0.0 || signals.is_empty() {
            return TradingSignal::hold(0.0, "No weighted strategies produced signals");
        }

        let mut weighted_score = 0.0;
        let mut weighted_confidence = 0.0;
        let mut weighted_multiplier = 0.0;
        for (name, signal) in signals {
            let weight = weights.get(name).copied().unwrap_or(0.0);
            weighted_score += action_score(signal.action) * signal.confidence / 100.0 * weight;
            weighted_confidence += signal.confidence * weight;
            weighted_multiplier += signal.position_size_multiplier * weight;
        }
        weighted_score /= total_weight;
        weighted_confidence /= total_weight;
        weighted_multiplier /= total_weight;

        let cfg = &self.combiner;
        let mut action = if weighted_score > cfg.buy_score_threshold {
            Action::Buy
        } else if weighted_score < cfg.sell_score_threshold {
            Action::Sell
        } else {
            Action::Hold
        };

        let mut confidence = weighted_confidence;
        if weighted_score.abs() > cfg.strong_score {
            confidence *= 1.1;
        } else if weighted_score.abs() < cfg.weak_score {
            confidence *= 0.8;
        }

        // Consensus check: how much weight actually voted the preliminary
        // action. A score-only majority is not enough to act on.
        let vote_share = signals
            .iter()
            .filter(|(_, signal)| signal.action == action)
            .filter_map(|(name, _)| weights.get(name))
            .sum::<f64>()
            / total_weight;

        let consensus_note;
        if vote_share >= cfg.strong_consensus {
            consensus_note = format!("strong consensus ({:.0}%)", vote_share * 100.0);
        } else if vote_share >= cfg.weak_consensus {
            consensus_note = format!(
                "majority consensus ({:.0}%), proceeding with caution",
                vote_share * 100.0
            );
        } else {
            consensus_note = format!(
                "No consensus (top share {:.0}%), overriding to HOLD",
                vote_share * 100.0
            );
            action = Action::Hold;
            confidence *= cfg.no_consensus_penalty;
        }

        let source = top_contributor(signals, weights, action);
        let components = component_summary(signals);

        let mut combined = TradingSignal::new(
            action,
            confidence.clamp(0.0, 100.0),
            format!(
                "Weighted vote {} (score {:+.2}): {}; components: {}",
                action, weighted_score, consensus_note, components
            ),
        )
        .with_multiplier(weighted_multiplier.clamp(0.5, 2.0));
        combined.source_strategy = source;
        combined
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

        self.current_regime = classify_regime(indicators, market);

        let weights = self.adjust_weights(market_obj, self.current_regime, &signals);
        let combined = self.combine_signals(&signals, &weights);

        self.record(&signals, &combined, market_obj);

        combined
    }

    /// Best-effort tracker recording; never affects the returned signal
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

impl DecisionEngine for StrategyManager {
    fn get_combined_signal(
        &mut self,
        market: &Value,
        indicators: &Value,
        portfolio: &Portfolio,
    ) -> TradingSignal {
        StrategyManager::get_combined_signal(self, market, indicators, portfolio)
    }

    fn regime_label(&self) -> &'static str {
        self.current_regime.as_str()
    }

    fn engine_name(&self) -> &'static str {
        "weighted"
    }
}

fn action_score(action: Action) -> f64 {
    match action {
        Action::Buy => 1.0,
        Action::Hold => 0.0,
        Action::Sell => -1.0,
    }
}

/// Static per-regime weight bias table
fn regime_bias(regime: MarketRegime, strategy: &str) -> f64 {
    match (regime, strategy) {
        (MarketRegime::Bull, "trend_following") => 0.05,
        (MarketRegime::Bull, "momentum") => 0.05,
        (MarketRegime::Bull, "mean_reversion") => -0.05,
        (MarketRegime::Bear, "mean_reversion") => 0.05,
        (MarketRegime::Bear, "llm_strategy") => 0.05,
        (MarketRegime::Bear, "trend_following") => -0.05,
        (MarketRegime::Bear, "momentum") => -0.05,
        (MarketRegime::Sideways, "mean_reversion") => 0.1,
        (MarketRegime::Sideways, "trend_following") => -0.05,
        (MarketRegime::Sideways, "momentum") => -0.05,
        _ => 0.0,
    }
}

/// Highest-conviction strategy that voted the final action
fn top_contributor(
    signals: &HashMap<String, TradingSignal>,
    weights: &HashMap<String, f64>,
    action: Action,
) -> Option<String> {
    signals
        .iter()
        .filter(|(_, signal)| signal.action == action)
        .max_by(|(a_name, a), (b_name, b)| {
            let a_score = a.confidence * weights.get(*a_name).copied().unwrap_or(0.0);
            let b_score = b.confidence * weights.get(*b_name).copied().unwrap_or(0.0);
            a_score.total_cmp(&b_score)
        })
        .map(|(name, _)| name.clone())
}

fn component_summary(signals: &HashMap<String, TradingSignal>) -> String {
    let mut parts: Vec<String> = signals
        .iter()
        .map(|(name, signal)| format!("{}={}@{:.0}", name, signal.action, signal.confidence))
        .collect();
    parts.sort();
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::InMemoryTracker;
    use serde_json::json;

    fn signal(action: Action, confidence: f64) -> TradingSignal {
        TradingSignal::new(action, confidence, "test")
    }

    fn equal_weights(names: &[&str]) -> HashMap<String, f64> {
        let w = 1.0 / names.len() as f64;
        names.iter().map(|n| (n.to_string(), w)).collect()
    }

    fn market_payload() -> Value {
        json!({
            "price": 100.0,
            "volume": 1200.0,
            "avg_volume": 1000.0,
            "price_changes": {"1h": 0.5, "4h": 1.0, "24h": 2.0, "5d": 6.0, "7d": 7.0},
        })
    }

    fn indicator_payload() -> Value {
        json!({
            "rsi": 62.0,
            "macd_histogram": 0.3,
            "bb_upper": 106.0,
            "bb_middle": 100.0,
            "bb_lower": 94.0,
            "sma_20": 99.0,
        })
    }

    #[test]
    fn test_unanimous_buy_passes_consensus() {
        let manager = StrategyManager::new("SOL-USD");
        let signals = HashMap::from([
            ("trend_following".to_string(), signal(Action::Buy, 80.0)),
            ("mean_reversion".to_string(), signal(Action::Buy, 70.0)),
            ("momentum".to_string(), signal(Action::Buy, 75.0)),
        ]);
        let weights = equal_weights(&["trend_following", "mean_reversion", "momentum"]);

        let combined = manager.combine_signals(&signals, &weights);
        assert_eq!(combined.action, Action::Buy);
        assert!(combined.reasoning.contains("strong consensus"));
        // |score| = 0.75 > 0.6: boost applied, then clamped to [0, 100]
        assert!(combined.confidence > 75.0);
        assert!(combined.confidence <= 100.0);
    }

    #[test]
    fn test_split_vote_forced_hold() {
        // One strategy each way: no action reaches 50% share
        let manager = StrategyManager::new("SOL-USD");
        let signals = HashMap::from([
            ("trend_following".to_string(), signal(Action::Buy, 90.0)),
            ("mean_reversion".to_string(), signal(Action::Sell, 20.0)),
            ("momentum".to_string(), signal(Action::Hold, 30.0)),
        ]);
        let weights = equal_weights(&["trend_following", "mean_reversion", "momentum"]);

        let combined = manager.combine_signals(&signals, &weights);
        assert_eq!(combined.action, Action::Hold);
        assert!(combined.reasoning.contains("No consensus"));
    }

    #[test]
    fn test_majority_consensus_proceeds_with_caution() {
        let manager = StrategyManager::new("SOL-USD");
        let signals = HashMap::from([
            ("trend_following".to_string(), signal(Action::Buy, 80.0)),
            ("mean_reversion".to_string(), signal(Action::Buy, 75.0)),
            ("momentum".to_string(), signal(Action::Hold, 30.0)),
            ("llm_strategy".to_string(), signal(Action::Hold, 40.0)),
        ]);
        let weights = equal_weights(&[
            "trend_following",
            "mean_reversion",
            "momentum",
            "llm_strategy",
        ]);

        let combined = manager.combine_signals(&signals, &weights);
        assert_eq!(combined.action, Action::Buy);
        assert!(combined.reasoning.contains("caution"));
    }

    #[test]
    fn test_weak_score_reduces_confidence() {
        let manager = StrategyManager::new("SOL-USD");
        // All holding: score 0, confidence x0.8
        let signals = HashMap::from([
            ("trend_following".to_string(), signal(Action::Hold, 50.0)),
            ("mean_reversion".to_string(), signal(Action::Hold, 50.0)),
            ("momentum".to_string(), signal(Action::Hold, 50.0)),
        ]);
        let weights = equal_weights(&["trend_following", "mean_reversion", "momentum"]);

        let combined = manager.combine_signals(&signals, &weights);
        assert_eq!(combined.action, Action::Hold);
        assert!((combined.confidence - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_multiplier_clamped() {
        let manager = StrategyManager::new("SOL-USD");
        let mut buy = signal(Action::Buy, 90.0);
        buy.position_size_multiplier = 5.0;
        let signals = HashMap::from([
            ("trend_following".to_string(), buy.clone()),
            ("mean_reversion".to_string(), buy.clone()),
            ("momentum".to_string(), buy),
        ]);
        let weights = equal_weights(&["trend_following", "mean_reversion", "momentum"]);

        let combined = manager.combine_signals(&signals, &weights);
        assert_eq!(combined.position_size_multiplier, 2.0);
    }

    #[test]
    fn test_update_weights_renormalizes() {
        let mut manager = StrategyManager::new("SOL-USD");
        manager.update_strategy_weights(HashMap::from([
            ("trend_following".to_string(), 0.6),
            ("mean_reversion".to_string(), 0.3),
            ("momentum".to_string(), 0.3),
        ]));

        let weights = manager.strategy_weights();
        let sum: f64 = weights.values().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!((weights["trend_following"] - 0.5).abs() < 1e-9);
        assert!((weights["mean_reversion"] - 0.25).abs() < 1e-9);
        assert!((weights["momentum"] - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_update_weights_rejects_non_positive() {
        let mut manager = StrategyManager::new("SOL-USD");
        let before = manager.strategy_weights().clone();
        manager.update_strategy_weights(HashMap::from([
            ("trend_following".to_string(), 0.0),
            ("momentum".to_string(), 0.0),
        ]));
        assert_eq!(manager.strategy_weights(), &before);
    }

    #[test]
    fn test_invalid_payloads_hold_zero() {
        let mut manager = StrategyManager::new("SOL-USD");
        let portfolio = Portfolio::default();

        let bad_market =
            manager.get_combined_signal(&json!(42.0), &indicator_payload(), &portfolio);
        assert_eq!(bad_market.action, Action::Hold);
        assert_eq!(bad_market.confidence, 0.0);
        assert!(bad_market.reasoning.contains("market data"));

        let bad_indicators =
            manager.get_combined_signal(&market_payload(), &json!("rsi=50"), &portfolio);
        assert_eq!(bad_indicators.action, Action::Hold);
        assert_eq!(bad_indicators.confidence, 0.0);
        assert!(bad_indicators.reasoning.contains("technical indicators"));
    }

    #[test]
    fn test_combined_signal_updates_regime_and_records() {
        let tracker = Arc::new(InMemoryTracker::new());
        let mut manager = StrategyManager::new("SOL-USD").with_tracker(tracker.clone());

        let signal = manager.get_combined_signal(
            &market_payload(),
            &indicator_payload(),
            &Portfolio::default(),
        );

        assert!(signal.confidence >= 0.0 && signal.confidence <= 100.0);
        assert_eq!(tracker.len(), 1);
        // Regime was classified and stored
        let perf = manager.get_strategy_performance();
        assert!(perf["current_regime"].is_string());
    }

    #[test]
    fn test_tracker_failure_swallowed() {
        struct FailingTracker;
        impl PerformanceTracker for FailingTracker {
            fn record_decision(
                &self,
                _product_id: &str,
                _signals: &HashMap<String, TradingSignal>,
                _final_decision: &TradingSignal,
                _price: f64,
            ) -> crate::Result<()> {
                Err("disk full".into())
            }
        }

        let mut manager = StrategyManager::new("SOL-USD").with_tracker(Arc::new(FailingTracker));
        let signal = manager.get_combined_signal(
            &market_payload(),
            &indicator_payload(),
            &Portfolio::default(),
        );

        // Tick still produced a valid signal
        assert!(signal.confidence >= 0.0 && signal.confidence <= 100.0);
    }

    #[test]
    fn test_adjusted_weights_sum_to_one() {
        let manager = StrategyManager::new("SOL-USD");
        let market = market_payload();
        let signals = manager.analyze_all_strategies(
            &market,
            &indicator_payload(),
            &Portfolio::default(),
        );

        for regime in [MarketRegime::Bull, MarketRegime::Bear, MarketRegime::Sideways] {
            let adjusted =
                manager.adjust_weights(market.as_object().unwrap(), regime, &signals);
            let sum: f64 = adjusted.values().sum();
            assert!((sum - 1.0).abs() < 1e-9, "regime {:?} sum {}", regime, sum);
            assert!(adjusted.values().all(|w| *w > 0.0));
        }
    }

    #[test]
    fn test_sideways_regime_favors_mean_reversion() {
        let manager = StrategyManager::new("SOL-USD");
        let market = market_payload();
        let signals = manager.analyze_all_strategies(
            &market,
            &indicator_payload(),
            &Portfolio::default(),
        );

        let adjusted = manager.adjust_weights(
            market.as_object().unwrap(),
            MarketRegime::Sideways,
            &signals,
        );
        // Base weight gap (0.4 vs 0.3) is overcome by suitability + bias
        assert!(adjusted["mean_reversion"] > adjusted["trend_following"]);
    }
}
