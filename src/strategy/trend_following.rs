use super::{require, Strategy, INVALID_INDICATORS};
use crate::models::{Action, Portfolio, TradingSignal};
use crate::regime::MarketRegime;
use serde_json::{Map, Value};

/// Trend-following strategy
///
/// Scores trend strength from three independent factors (MACD histogram
/// magnitude, RSI distance from 50, price position inside the Bollinger
/// channel) and trend direction from three signed votes. Trades only when
/// both agree: a clear direction with strength above the entry threshold,
/// guarded against chasing RSI extremes.
#[derive(Debug, Clone)]
pub struct TrendFollowingStrategy {
    config: TrendFollowingConfig,
}

#[derive(Debug, Clone)]
pub struct TrendFollowingConfig {
    /// Minimum trend strength before acting (0-1)
    pub strength_entry: f64,

    /// RSI above this vetoes a BUY into an extended move
    pub rsi_overbought: f64,

    /// RSI below this vetoes a SELL into capitulation
    pub rsi_oversold: f64,

    /// Minimum average directional vote to call the trend up/down
    pub direction_threshold: f64,
}

impl Default for TrendFollowingConfig {
    fn default() -> Self {
        Self {
            strength_entry: 0.6,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            direction_threshold: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TrendDirection {
    Up,
    Down,
    Sideways,
}

impl TrendFollowingStrategy {
    pub fn new(config: TrendFollowingConfig) -> Self {
        Self { config }
    }

    fn evaluate(
        &self,
        market: &Map<String, Value>,
        ind: &Map<String, Value>,
    ) -> crate::Result<TradingSignal> {
        let price = require(market, "price")?;
        let rsi = require(ind, "rsi")?;
        let histogram = require(ind, "macd_histogram")?;
        let bb_upper = require(ind, "bb_upper")?;
        let bb_middle = require(ind, "bb_middle")?;
        let bb_lower = require(ind, "bb_lower")?;

        let band_range = bb_upper - bb_lower;
        if band_range <= 0.0 {
            return Err(format!("degenerate Bollinger bands (range {:.6})", band_range).into());
        }

        // Strength: average of three bucket scores
        let macd_score = bucket_score(histogram.abs(), 0.5, 0.2);
        let rsi_score = bucket_score((rsi - 50.0).abs(), 20.0, 10.0);
        let band_position = (price - bb_lower) / band_range;
        let bb_score = if band_position >= 0.9 || band_position <= 0.1 {
            0.8
        } else if band_position >= 2.0 / 3.0 || band_position <= 1.0 / 3.0 {
            0.6
        } else {
            0.4
        };
        let strength = (macd_score + rsi_score + bb_score) / 3.0;

        // Direction: average of three signed votes
        let votes = [
            sign_vote(histogram, 0.0),
            if rsi > 55.0 {
                1
            } else if rsi < 45.0 {
                -1
            } else {
                0
            },
            if price > bb_middle * 1.01 {
                1
            } else if price < bb_middle * 0.99 {
                -1
            } else {
                0
            },
        ];
        let vote_avg = votes.iter().sum::<i32>() as f64 / votes.len() as f64;
        let direction = if vote_avg > self.config.direction_threshold {
            TrendDirection::Up
        } else if vote_avg < -self.config.direction_threshold {
            TrendDirection::Down
        } else {
            TrendDirection::Sideways
        };
        let expected = match direction {
            TrendDirection::Up => 1,
            TrendDirection::Down => -1,
            TrendDirection::Sideways => 0,
        };
        let aligned = votes.iter().filter(|&&v| v == expected && v != 0).count();

        let mut confidence = strength * 60.0
            + if direction != TrendDirection::Sideways {
                20.0
            } else {
                0.0
            }
            + 5.0 * aligned as f64;
        confidence = confidence.clamp(20.0, 95.0);

        let multiplier = (0.5 + strength).min(1.5);

        let signal = match direction {
            TrendDirection::Up if strength > self.config.strength_entry => {
                if rsi > self.config.rsi_overbought {
                    TradingSignal::hold(
                        (confidence * 0.7).clamp(20.0, 95.0),
                        format!(
                            "Uptrend strength {:.2} but RSI {:.1} overbought, not chasing",
                            strength, rsi
                        ),
                    )
                } else {
                    TradingSignal::new(
                        Action::Buy,
                        (confidence + 10.0).min(95.0),
                        format!(
                            "Uptrend confirmed: strength {:.2}, {}/3 indicators aligned",
                            strength, aligned
                        ),
                    )
                    .with_multiplier(multiplier)
                }
            }
            TrendDirection::Down if strength > self.config.strength_entry => {
                if rsi < self.config.rsi_oversold {
                    TradingSignal::hold(
                        (confidence * 0.7).clamp(20.0, 95.0),
                        format!(
                            "Downtrend strength {:.2} but RSI {:.1} oversold, not selling the low",
                            strength, rsi
                        ),
                    )
                } else {
                    TradingSignal::new(
                        Action::Sell,
                        (confidence + 10.0).min(95.0),
                        format!(
                            "Downtrend confirmed: strength {:.2}, {}/3 indicators aligned",
                            strength, aligned
                        ),
                    )
                    .with_multiplier(multiplier)
                }
            }
            _ => TradingSignal::hold(
                confidence,
                format!(
                    "No tradeable trend: direction vote {:.2}, strength {:.2}",
                    vote_avg, strength
                ),
            ),
        };

        Ok(signal)
    }
}

impl Default for TrendFollowingStrategy {
    fn default() -> Self {
        Self::new(TrendFollowingConfig::default())
    }
}

/// 0.8 above the high threshold, 0.6 above the low one, 0.3 otherwise
fn bucket_score(magnitude: f64, high: f64, low: f64) -> f64 {
    if magnitude > high {
        0.8
    } else if magnitude > low {
        0.6
    } else {
        0.3
    }
}

fn sign_vote(value: f64, dead_zone: f64) -> i32 {
    if value > dead_zone {
        1
    } else if value < -dead_zone {
        -1
    } else {
        0
    }
}

impl Strategy for TrendFollowingStrategy {
    fn analyze(&self, market: &Value, indicators: &Value, _portfolio: &Portfolio) -> TradingSignal {
        let Some(ind) = indicators.as_object() else {
            return TradingSignal::hold(50.0, INVALID_INDICATORS).with_source(self.name());
        };
        let market_obj = market.as_object();

        let result = match market_obj {
            Some(mkt) => self.evaluate(mkt, ind),
            None => Err("market data is not a mapping".into()),
        };

        match result {
            Ok(signal) => signal.with_source(self.name()),
            Err(e) => {
                tracing::error!("trend_following analysis failed: {}", e);
                TradingSignal::hold(0.0, format!("Analysis error: {}", e)).with_source(self.name())
            }
        }
    }

    fn name(&self) -> &'static str {
        "trend_following"
    }

    fn regime_suitability(&self, regime: MarketRegime) -> f64 {
        match regime {
            MarketRegime::Bull => 0.9,
            MarketRegime::Bear => 0.7,
            MarketRegime::Sideways => 0.3,
        }
    }
}
