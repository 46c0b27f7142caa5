use super::{price_change, require, Strategy, INVALID_INDICATORS};
use crate::models::{Action, Portfolio, TradingSignal};
use crate::regime::MarketRegime;
use serde_json::{Map, Value};

/// Momentum strategy
///
/// Blends three sub-analyses: multi-window price momentum (1h/4h/24h
/// weighted returns), volume momentum (current vs average ratio) and
/// technical momentum (RSI + MACD histogram). Volume amplifies the price
/// component rather than voting on its own; RSI extremes veto entries into
/// exhausted moves.
#[derive(Debug, Clone)]
pub struct MomentumStrategy {
    config: MomentumConfig,
}

#[derive(Debug, Clone)]
pub struct MomentumConfig {
    /// Weighted-return magnitude that counts as a moderate move (percent)
    pub moderate_move_pct: f64,

    /// Weighted-return magnitude that counts as a strong move (percent)
    pub strong_move_pct: f64,

    /// RSI above this vetoes momentum BUYs
    pub rsi_exhaustion_high: f64,

    /// RSI below this vetoes momentum SELLs
    pub rsi_exhaustion_low: f64,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            moderate_move_pct: 2.0,
            strong_move_pct: 5.0,
            rsi_exhaustion_high: 85.0,
            rsi_exhaustion_low: 15.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MomentumBucket {
    StrongBullish,
    Bullish,
    Neutral,
    Bearish,
    StrongBearish,
}

impl MomentumBucket {
    fn label(&self) -> &'static str {
        match self {
            MomentumBucket::StrongBullish => "strong bullish",
            MomentumBucket::Bullish => "bullish",
            MomentumBucket::Neutral => "neutral",
            MomentumBucket::Bearish => "bearish",
            MomentumBucket::StrongBearish => "strong bearish",
        }
    }

    fn is_strong(&self) -> bool {
        matches!(self, MomentumBucket::StrongBullish | MomentumBucket::StrongBearish)
    }
}

impl MomentumStrategy {
    pub fn new(config: MomentumConfig) -> Self {
        Self { config }
    }

    /// Signed price momentum from weighted 1h/4h/24h returns.
    /// Returns (signed direction, strength in [0, 0.9]).
    fn price_momentum(&self, market: &Map<String, Value>) -> (f64, f64) {
        let weighted = price_change(market, "1h") * 0.5
            + price_change(market, "4h") * 0.3
            + price_change(market, "24h") * 0.2;
        let magnitude = weighted.abs();

        let strength = if magnitude >= self.config.strong_move_pct {
            (0.6 + (magnitude - self.config.strong_move_pct) / 20.0).min(0.9)
        } else if magnitude >= self.config.moderate_move_pct {
            0.4 + (magnitude - self.config.moderate_move_pct) / 15.0
        } else {
            0.2
        };

        (weighted.signum(), strength)
    }

    /// Volume momentum strength from the current/average volume ratio
    fn volume_momentum(volume: f64, avg_volume: f64) -> f64 {
        if avg_volume <= 0.0 {
            return 0.2;
        }
        let ratio = volume / avg_volume;
        if ratio >= 2.0 {
            0.9
        } else if ratio >= 1.5 {
            0.7
        } else if ratio >= 0.8 {
            0.4
        } else {
            0.2
        }
    }

    /// Technical momentum: mean of a linear RSI score and a bucketed MACD
    /// histogram score, each signed and capped at ±0.8
    fn technical_momentum(rsi: f64, histogram: f64) -> f64 {
        let rsi_score = ((rsi - 50.0) / 30.0 * 0.8).clamp(-0.8, 0.8);

        let macd_score = if histogram == 0.0 {
            0.0
        } else {
            let magnitude = histogram.abs();
            let score = if magnitude > 0.5 {
                0.8
            } else if magnitude > 0.1 {
                0.5
            } else {
                0.2
            };
            score * histogram.signum()
        };

        (rsi_score + macd_score) / 2.0
    }

    fn evaluate(
        &self,
        market: &Map<String, Value>,
        ind: &Map<String, Value>,
    ) -> crate::Result<TradingSignal> {
        let rsi = require(ind, "rsi")?;
        let histogram = require(ind, "macd_histogram")?;
        let volume = require(market, "volume")?;
        let avg_volume = require(market, "avg_volume")?;

        let (price_direction, price_strength) = self.price_momentum(market);
        let volume_strength = Self::volume_momentum(volume, avg_volume);
        let technical = Self::technical_momentum(rsi, histogram);

        // Volume amplifies conviction in the price move, never creates it
        let volume_amplifier = 1.0 + volume_strength * 0.5;
        let score =
            price_direction * price_strength * 0.4 * volume_amplifier + technical * 0.3;

        let bucket = if score >= 0.4 {
            MomentumBucket::StrongBullish
        } else if score >= 0.2 {
            MomentumBucket::Bullish
        } else if score <= -0.4 {
            MomentumBucket::StrongBearish
        } else if score <= -0.2 {
            MomentumBucket::Bearish
        } else {
            MomentumBucket::Neutral
        };

        let strength = (score.abs() * 1.25).min(0.95);
        let base_confidence = strength * 70.0 + 20.0;
        let action_bonus = if bucket.is_strong() { 15.0 } else { 10.0 };
        let multiplier = if bucket.is_strong() {
            (1.0 + 0.8 * strength).min(1.8)
        } else {
            (0.8 + 0.6 * strength).min(1.4)
        };

        let signal = match bucket {
            MomentumBucket::StrongBullish | MomentumBucket::Bullish => {
                if rsi > self.config.rsi_exhaustion_high {
                    TradingSignal::hold(
                        base_confidence * 0.6,
                        format!(
                            "{} momentum (score {:+.2}) but RSI {:.1} overbought, move exhausted",
                            bucket.label(),
                            score,
                            rsi
                        ),
                    )
                    .with_multiplier(0.6)
                } else {
                    TradingSignal::new(
                        Action::Buy,
                        (base_confidence + action_bonus).min(95.0),
                        format!(
                            "{} momentum: score {:+.2}, volume {:.1}x amplifier",
                            bucket.label(),
                            score,
                            volume_amplifier
                        ),
                    )
                    .with_multiplier(multiplier)
                }
            }
            MomentumBucket::StrongBearish | MomentumBucket::Bearish => {
                if rsi < self.config.rsi_exhaustion_low {
                    TradingSignal::hold(
                        base_confidence * 0.6,
                        format!(
                            "{} momentum (score {:+.2}) but RSI {:.1} oversold, move exhausted",
                            bucket.label(),
                            score,
                            rsi
                        ),
                    )
                    .with_multiplier(0.6)
                } else {
                    TradingSignal::new(
                        Action::Sell,
                        (base_confidence + action_bonus).min(95.0),
                        format!(
                            "{} momentum: score {:+.2}, volume {:.1}x amplifier",
                            bucket.label(),
                            score,
                            volume_amplifier
                        ),
                    )
                    .with_multiplier(multiplier)
                }
            }
            MomentumBucket::Neutral => TradingSignal::hold(
                base_confidence * 0.7,
                format!("No momentum edge: score {:+.2}", score),
            )
            .with_multiplier(0.6),
        };

        Ok(signal)
    }
}

impl Default for MomentumStrategy {
    fn default() -> Self {
        Self::new(MomentumConfig::default())
    }
}

impl Strategy for MomentumStrategy {
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
                tracing::error!("momentum analysis failed: {}", e);
                TradingSignal::hold(0.0, format!("Analysis error: {}", e)).with_source(self.name())
            }
        }
    }

    fn name(&self) -> &'static str {
        "momentum"
    }

    fn regime_suitability(&self, regime: MarketRegime) -> f64 {
        match regime {
            MarketRegime::Bull => 0.85,
            MarketRegime::Bear => 0.6,
            MarketRegime::Sideways => 0.25,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn market(c1h: f64, c4h: f64, c24h: f64, volume: f64, avg_volume: f64) -> Value {
        json!({
            "price": 100.0,
            "volume": volume,
            "avg_volume": avg_volume,
            "price_changes": {"1h": c1h, "4h": c4h, "24h": c24h},
        })
    }

    fn indicators(rsi: f64, histogram: f64) -> Value {
        json!({"rsi": rsi, "macd_histogram": histogram})
    }

    #[test]
    fn test_strong_rally_with_volume_buys() {
        // ~6.1% weighted move, 2x volume, bullish technicals
        let signal = MomentumStrategy::default().analyze(
            &market(5.0, 6.0, 9.0, 2000.0, 1000.0),
            &indicators(68.0, 0.6),
            &Portfolio::default(),
        );

        assert_eq!(signal.action, Action::Buy);
        assert!(signal.confidence > 70.0);
        assert!(signal.confidence <= 95.0);
        assert!(signal.position_size_multiplier > 1.0);
        assert!(signal.position_size_multiplier <= 1.8);
    }

    #[test]
    fn test_exhausted_rally_holds() {
        let signal = MomentumStrategy::default().analyze(
            &market(5.0, 6.0, 9.0, 2000.0, 1000.0),
            &indicators(90.0, 0.6),
            &Portfolio::default(),
        );

        assert_eq!(signal.action, Action::Hold);
        assert!(signal.reasoning.contains("overbought"));
    }

    #[test]
    fn test_strong_selloff_sells() {
        let signal = MomentumStrategy::default().analyze(
            &market(-5.0, -6.0, -9.0, 2500.0, 1000.0),
            &indicators(32.0, -0.6),
            &Portfolio::default(),
        );

        assert_eq!(signal.action, Action::Sell);
    }

    #[test]
    fn test_capitulation_not_sold() {
        let signal = MomentumStrategy::default().analyze(
            &market(-5.0, -6.0, -9.0, 2500.0, 1000.0),
            &indicators(10.0, -0.6),
            &Portfolio::default(),
        );

        assert_eq!(signal.action, Action::Hold);
        assert!(signal.reasoning.contains("oversold"));
    }

    #[test]
    fn test_flat_market_holds() {
        let signal = MomentumStrategy::default().analyze(
            &market(0.1, -0.2, 0.3, 1000.0, 1000.0),
            &indicators(50.0, 0.02),
            &Portfolio::default(),
        );

        assert_eq!(signal.action, Action::Hold);
        assert_eq!(signal.position_size_multiplier, 0.6);
    }

    #[test]
    fn test_low_volume_dampens_but_technicals_can_carry() {
        // Same price move, drying-up volume: score shrinks
        let strong = MomentumStrategy::default().analyze(
            &market(4.0, 4.0, 4.0, 2500.0, 1000.0),
            &indicators(60.0, 0.3),
            &Portfolio::default(),
        );
        let weak = MomentumStrategy::default().analyze(
            &market(4.0, 4.0, 4.0, 500.0, 1000.0),
            &indicators(60.0, 0.3),
            &Portfolio::default(),
        );

        assert!(weak.confidence <= strong.confidence);
    }

    #[test]
    fn test_non_mapping_indicators_hold() {
        let signal = MomentumStrategy::default().analyze(
            &market(1.0, 1.0, 1.0, 1000.0, 1000.0),
            &json!("scalar"),
            &Portfolio::default(),
        );
        assert_eq!(signal.action, Action::Hold);
        assert_eq!(signal.confidence, 50.0);
        assert_eq!(signal.reasoning, INVALID_INDICATORS);
    }

    #[test]
    fn test_missing_volume_analysis_error() {
        let signal = MomentumStrategy::default().analyze(
            &json!({"price": 100.0, "price_changes": {"1h": 1.0}}),
            &indicators(50.0, 0.1),
            &Portfolio::default(),
        );
        assert_eq!(signal.action, Action::Hold);
        assert_eq!(signal.confidence, 0.0);
        assert!(signal.reasoning.starts_with("Analysis error:"));
    }
}
