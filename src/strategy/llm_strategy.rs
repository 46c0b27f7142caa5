use super::{field, price_change, require, Strategy, INVALID_INDICATORS};
use crate::llm::{LlmAnalyzer, SentimentProvider};
use crate::models::{Action, MarketContext, Portfolio, TradingSignal};
use crate::regime::MarketRegime;
use serde_json::{Map, Value};
use std::sync::Arc;

/// LLM-backed strategy
///
/// Delegates the base decision to an external LLM analyzer and optionally
/// adjusts confidence with news sentiment. Everything the analyzer returns
/// is treated as untrusted: unknown actions are coerced to HOLD and
/// confidence is clamped before the signal leaves this strategy.
pub struct LlmStrategy {
    analyzer: Arc<dyn LlmAnalyzer>,
    sentiment: Option<Arc<dyn SentimentProvider>>,
    product_id: String,
}

// Confidence assigned when the analyzer fails or returns garbage
const DEGRADED_CONFIDENCE: f64 = 30.0;

// Sentiment must clear this magnitude to count as directional
const SENTIMENT_DEAD_ZONE: f64 = 0.2;

impl LlmStrategy {
    pub fn new(analyzer: Arc<dyn LlmAnalyzer>, product_id: impl Into<String>) -> Self {
        Self {
            analyzer,
            sentiment: None,
            product_id: product_id.into(),
        }
    }

    pub fn with_sentiment(mut self, provider: Arc<dyn SentimentProvider>) -> Self {
        self.sentiment = Some(provider);
        self
    }

    fn build_context(
        &self,
        market: &Map<String, Value>,
        ind: &Map<String, Value>,
    ) -> crate::Result<MarketContext> {
        let current_price = require(market, "price")?;

        let volume = field(market, "volume").unwrap_or(0.0);
        let avg_volume = field(market, "avg_volume").unwrap_or(0.0);
        let volume_ratio = if avg_volume > 0.0 { volume / avg_volume } else { 1.0 };

        let bb_width_pct = match (
            field(ind, "bb_upper"),
            field(ind, "bb_lower"),
            field(ind, "bb_middle"),
        ) {
            (Some(upper), Some(lower), Some(middle)) if middle != 0.0 => {
                (upper - lower) / middle * 100.0
            }
            _ => 0.0,
        };

        Ok(MarketContext {
            product_id: self.product_id.clone(),
            current_price,
            price_change_24h: price_change(market, "24h"),
            price_change_7d: price_change(market, "7d"),
            rsi: field(ind, "rsi").unwrap_or(50.0),
            macd_histogram: field(ind, "macd_histogram").unwrap_or(0.0),
            bb_width_pct,
            volume_ratio,
        })
    }

    /// Sentiment-aligned actions gain confidence, misaligned ones lose it,
    /// HOLD gets a small nudge either way
    fn apply_sentiment(&self, action: Action, confidence: f64, reasoning: &mut String) -> f64 {
        let Some(provider) = &self.sentiment else {
            return confidence;
        };

        let report = match provider.sentiment(&self.product_id) {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("sentiment lookup failed for {}: {}", self.product_id, e);
                return confidence;
            }
        };

        let score = report.overall_sentiment.clamp(-1.0, 1.0);
        let weight = report.confidence.clamp(0.0, 1.0);

        let adjustment = match action {
            Action::Buy if score > SENTIMENT_DEAD_ZONE => score.abs() * 10.0 * weight,
            Action::Sell if score < -SENTIMENT_DEAD_ZONE => score.abs() * 10.0 * weight,
            Action::Buy if score < -SENTIMENT_DEAD_ZONE => -(score.abs() * 5.0 * weight),
            Action::Sell if score > SENTIMENT_DEAD_ZONE => -(score.abs() * 5.0 * weight),
            Action::Hold => score.abs() * 2.0 * weight,
            _ => 0.0,
        };

        if adjustment != 0.0 {
            reasoning.push_str(&format!(
                "; news sentiment {} ({:+.2}, {} articles) adjusted confidence by {:+.1}",
                report.sentiment_category, score, report.article_count, adjustment
            ));
        }

        (confidence + adjustment).clamp(0.0, 100.0)
    }

    fn evaluate(
        &self,
        market: &Map<String, Value>,
        ind: &Map<String, Value>,
    ) -> crate::Result<TradingSignal> {
        let context = self.build_context(market, ind)?;

        let decision = match self.analyzer.analyze(&context) {
            Ok(decision) => decision,
            Err(e) => {
                tracing::error!("LLM analyzer failed for {}: {}", self.product_id, e);
                return Ok(TradingSignal::hold(
                    DEGRADED_CONFIDENCE,
                    format!("LLM analysis error: {}", e),
                ));
            }
        };

        let (action, mut reasoning) = match Action::parse(&decision.decision) {
            Some(action) => (action, decision.reasoning),
            None => {
                tracing::warn!(
                    "LLM returned invalid action '{}' for {}, coercing to HOLD",
                    decision.decision,
                    self.product_id
                );
                return Ok(TradingSignal::hold(
                    DEGRADED_CONFIDENCE,
                    format!("LLM returned invalid action '{}'", decision.decision),
                ));
            }
        };

        let confidence = if decision.confidence.is_finite() {
            decision.confidence.clamp(0.0, 100.0)
        } else {
            DEGRADED_CONFIDENCE
        };

        let confidence = self.apply_sentiment(action, confidence, &mut reasoning);

        Ok(TradingSignal::new(action, confidence, reasoning))
    }
}

impl Strategy for LlmStrategy {
    fn analyze(&self, market: &Value, indicators: &Value, _portfolio: &Portfolio) -> TradingSignal {
        let Some(ind) = indicators.as_object() else {
            return TradingSignal::hold(50.0, INVALID_INDICATORS).with_source(self.name());
        };

        let result = match market.as_object() {
            Some(mkt) => self.evaluate(mkt, ind),
            None => Err("market data is not a mapping".into()),
        };

        match result {
            Ok(signal) => signal.with_source(self.name()),
            Err(e) => {
                tracing::error!("llm_strategy analysis failed: {}", e);
                TradingSignal::hold(0.0, format!("Analysis error: {}", e)).with_source(self.name())
            }
        }
    }

    fn name(&self) -> &'static str {
        "llm_strategy"
    }

    fn regime_suitability(&self, regime: MarketRegime) -> f64 {
        match regime {
            MarketRegime::Bull => 0.7,
            MarketRegime::Bear => 0.7,
            MarketRegime::Sideways => 0.6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::models::{LlmDecision, NewsSentiment};
    use serde_json::json;

    struct FixedAnalyzer {
        decision: String,
        confidence: f64,
    }

    impl LlmAnalyzer for FixedAnalyzer {
        fn analyze(&self, _context: &MarketContext) -> Result<LlmDecision, LlmError> {
            Ok(LlmDecision {
                decision: self.decision.clone(),
                confidence: self.confidence,
                reasoning: "test reasoning".to_string(),
            })
        }
    }

    struct FailingAnalyzer;

    impl LlmAnalyzer for FailingAnalyzer {
        fn analyze(&self, _context: &MarketContext) -> Result<LlmDecision, LlmError> {
            Err(LlmError::Parse("boom".to_string()))
        }
    }

    struct FixedSentiment {
        score: f64,
        confidence: f64,
    }

    impl SentimentProvider for FixedSentiment {
        fn sentiment(&self, _asset: &str) -> Result<NewsSentiment, LlmError> {
            Ok(NewsSentiment {
                overall_sentiment: self.score,
                sentiment_category: "test".to_string(),
                confidence: self.confidence,
                article_count: 12,
            })
        }
    }

    fn market() -> Value {
        json!({
            "price": 100.0,
            "volume": 1500.0,
            "avg_volume": 1000.0,
            "price_changes": {"24h": 2.0, "7d": 5.0},
        })
    }

    fn indicators() -> Value {
        json!({
            "rsi": 60.0,
            "macd_histogram": 0.3,
            "bb_upper": 105.0,
            "bb_middle": 100.0,
            "bb_lower": 95.0,
        })
    }

    fn strategy(analyzer: impl LlmAnalyzer + 'static) -> LlmStrategy {
        LlmStrategy::new(Arc::new(analyzer), "SOL-USD")
    }

    #[test]
    fn test_valid_buy_passes_through() {
        let signal = strategy(FixedAnalyzer {
            decision: "BUY".to_string(),
            confidence: 70.0,
        })
        .analyze(&market(), &indicators(), &Portfolio::default());

        assert_eq!(signal.action, Action::Buy);
        assert_eq!(signal.confidence, 70.0);
        assert_eq!(signal.source_strategy.as_deref(), Some("llm_strategy"));
    }

    #[test]
    fn test_invalid_action_coerced_to_hold() {
        let signal = strategy(FixedAnalyzer {
            decision: "YOLO LONG".to_string(),
            confidence: 99.0,
        })
        .analyze(&market(), &indicators(), &Portfolio::default());

        assert_eq!(signal.action, Action::Hold);
        assert_eq!(signal.confidence, 30.0);
        assert!(signal.reasoning.contains("invalid action"));
    }

    #[test]
    fn test_analyzer_failure_degrades() {
        let signal =
            strategy(FailingAnalyzer).analyze(&market(), &indicators(), &Portfolio::default());

        assert_eq!(signal.action, Action::Hold);
        assert_eq!(signal.confidence, 30.0);
        assert!(signal.reasoning.contains("LLM analysis error"));
    }

    #[test]
    fn test_out_of_range_confidence_clamped() {
        let signal = strategy(FixedAnalyzer {
            decision: "SELL".to_string(),
            confidence: 140.0,
        })
        .analyze(&market(), &indicators(), &Portfolio::default());

        assert_eq!(signal.confidence, 100.0);
    }

    #[test]
    fn test_aligned_sentiment_boosts_buy() {
        let s = strategy(FixedAnalyzer {
            decision: "BUY".to_string(),
            confidence: 60.0,
        })
        .with_sentiment(Arc::new(FixedSentiment {
            score: 0.5,
            confidence: 0.8,
        }));

        let signal = s.analyze(&market(), &indicators(), &Portfolio::default());
        // 60 + 0.5 * 10 * 0.8 = 64
        assert!((signal.confidence - 64.0).abs() < 1e-9);
        assert!(signal.reasoning.contains("sentiment"));
    }

    #[test]
    fn test_misaligned_sentiment_penalizes_buy() {
        let s = strategy(FixedAnalyzer {
            decision: "BUY".to_string(),
            confidence: 60.0,
        })
        .with_sentiment(Arc::new(FixedSentiment {
            score: -0.6,
            confidence: 1.0,
        }));

        let signal = s.analyze(&market(), &indicators(), &Portfolio::default());
        // 60 - 0.6 * 5 * 1.0 = 57
        assert!((signal.confidence - 57.0).abs() < 1e-9);
    }

    #[test]
    fn test_hold_gets_small_sentiment_nudge() {
        let s = strategy(FixedAnalyzer {
            decision: "HOLD".to_string(),
            confidence: 50.0,
        })
        .with_sentiment(Arc::new(FixedSentiment {
            score: -0.9,
            confidence: 1.0,
        }));

        let signal = s.analyze(&market(), &indicators(), &Portfolio::default());
        // 50 + 0.9 * 2 * 1.0 = 51.8
        assert!((signal.confidence - 51.8).abs() < 1e-9);
    }

    #[test]
    fn test_neutral_sentiment_no_adjustment() {
        let s = strategy(FixedAnalyzer {
            decision: "BUY".to_string(),
            confidence: 60.0,
        })
        .with_sentiment(Arc::new(FixedSentiment {
            score: 0.1,
            confidence: 1.0,
        }));

        let signal = s.analyze(&market(), &indicators(), &Portfolio::default());
        assert_eq!(signal.confidence, 60.0);
    }

    #[test]
    fn test_non_mapping_indicators_hold() {
        let signal = strategy(FixedAnalyzer {
            decision: "BUY".to_string(),
            confidence: 80.0,
        })
        .analyze(&market(), &json!(3.14), &Portfolio::default());

        assert_eq!(signal.action, Action::Hold);
        assert_eq!(signal.confidence, 50.0);
        assert_eq!(signal.reasoning, INVALID_INDICATORS);
    }
}
