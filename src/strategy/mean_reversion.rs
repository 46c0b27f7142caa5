use super::{require, Strategy, INVALID_INDICATORS};
use crate::models::{Action, Portfolio, TradingSignal};
use crate::regime::MarketRegime;
use serde_json::{Map, Value};

/// Mean reversion strategy
///
/// Fades extremes: an RSI ladder and a Bollinger-band breach are scored
/// independently, then blended 60/40 on both their discrete tier and their
/// continuous strength. Designed to capture overreactions in ranging
/// markets; neutral the rest of the time.
#[derive(Debug, Clone)]
pub struct MeanReversionStrategy {
    config: MeanReversionConfig,
}

#[derive(Debug, Clone)]
pub struct MeanReversionConfig {
    /// Weight of the RSI tier in the blend (Bollinger gets the remainder)
    pub rsi_weight: f64,

    /// Band-width fraction past a band that upgrades a breach to "strong"
    pub strong_breach_fraction: f64,
}

impl Default for MeanReversionConfig {
    fn default() -> Self {
        Self {
            rsi_weight: 0.6,
            strong_breach_fraction: 0.1,
        }
    }
}

/// Discrete reversion tier shared by both sub-signals and the blend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    StrongBuy,
    Buy,
    Neutral,
    Sell,
    StrongSell,
}

impl Tier {
    fn value(&self) -> f64 {
        match self {
            Tier::StrongBuy => 2.0,
            Tier::Buy => 1.0,
            Tier::Neutral => 0.0,
            Tier::Sell => -1.0,
            Tier::StrongSell => -2.0,
        }
    }

    fn is_strong(&self) -> bool {
        matches!(self, Tier::StrongBuy | Tier::StrongSell)
    }

    fn label(&self) -> &'static str {
        match self {
            Tier::StrongBuy => "strong buy",
            Tier::Buy => "buy",
            Tier::Neutral => "neutral",
            Tier::Sell => "sell",
            Tier::StrongSell => "strong sell",
        }
    }
}

impl MeanReversionStrategy {
    pub fn new(config: MeanReversionConfig) -> Self {
        Self { config }
    }

    /// 5-tier RSI ladder
    fn rsi_signal(rsi: f64) -> (Tier, f64) {
        if rsi <= 20.0 {
            (Tier::StrongBuy, 0.9)
        } else if rsi <= 30.0 {
            (Tier::Buy, 0.7)
        } else if rsi >= 80.0 {
            (Tier::StrongSell, 0.9)
        } else if rsi >= 70.0 {
            (Tier::Sell, 0.7)
        } else {
            (Tier::Neutral, 0.2)
        }
    }

    /// Band-breach sub-signal. A breach deeper than 10% of the band width
    /// is a strong signal whose strength scales with the deviation; inside
    /// the bands the signal is neutral, stronger the closer to the middle.
    fn bollinger_signal(
        &self,
        price: f64,
        upper: f64,
        middle: f64,
        lower: f64,
    ) -> crate::Result<(Tier, f64)> {
        let band_width = upper - lower;
        if band_width <= 0.0 {
            return Err(format!("degenerate Bollinger bands (width {:.6})", band_width).into());
        }

        let strong = self.config.strong_breach_fraction;

        if price < lower {
            let deviation = (lower - price) / band_width;
            if deviation > strong {
                Ok((Tier::StrongBuy, (0.5 + deviation * 2.0).min(0.9)))
            } else {
                Ok((Tier::Buy, 0.6))
            }
        } else if price > upper {
            let deviation = (price - upper) / band_width;
            if deviation > strong {
                Ok((Tier::StrongSell, (0.5 + deviation * 2.0).min(0.9)))
            } else {
                Ok((Tier::Sell, 0.6))
            }
        } else {
            let half_width = band_width / 2.0;
            let distance_ratio = ((price - middle).abs() / half_width).clamp(0.0, 1.0);
            Ok((Tier::Neutral, (1.0 - distance_ratio) * 0.5))
        }
    }

    fn evaluate(
        &self,
        market: &Map<String, Value>,
        ind: &Map<String, Value>,
    ) -> crate::Result<TradingSignal> {
        let price = require(market, "price")?;
        let rsi = require(ind, "rsi")?;
        let bb_upper = require(ind, "bb_upper")?;
        let bb_middle = require(ind, "bb_middle")?;
        let bb_lower = require(ind, "bb_lower")?;

        let (rsi_tier, rsi_strength) = Self::rsi_signal(rsi);
        let (bb_tier, bb_strength) = self.bollinger_signal(price, bb_upper, bb_middle, bb_lower)?;

        let w_rsi = self.config.rsi_weight;
        let w_bb = 1.0 - w_rsi;
        let blended_value = rsi_tier.value() * w_rsi + bb_tier.value() * w_bb;
        let strength = rsi_strength * w_rsi + bb_strength * w_bb;

        let tier = if blended_value >= 1.5 {
            Tier::StrongBuy
        } else if blended_value >= 0.5 {
            Tier::Buy
        } else if blended_value <= -1.5 {
            Tier::StrongSell
        } else if blended_value <= -0.5 {
            Tier::Sell
        } else {
            Tier::Neutral
        };

        let reasoning = format!(
            "Mean reversion {}: RSI {:.1} ({}), price vs bands {} (blend {:+.2}, strength {:.2})",
            tier.label(),
            rsi,
            rsi_tier.label(),
            bb_tier.label(),
            blended_value,
            strength
        );

        let signal = match tier {
            Tier::Neutral => TradingSignal::hold((strength * 80.0).max(20.0), reasoning)
                .with_multiplier(0.5),
            _ => {
                let bonus = if tier.is_strong() { 10.0 } else { 0.0 };
                let confidence = (strength * 80.0 + 15.0 + bonus).min(95.0);
                let multiplier = if tier.is_strong() {
                    (0.8 + 0.7 * strength).min(1.5)
                } else {
                    (0.6 + 0.6 * strength).min(1.2)
                };
                let action = if blended_value > 0.0 { Action::Buy } else { Action::Sell };
                TradingSignal::new(action, confidence, reasoning).with_multiplier(multiplier)
            }
        };

        Ok(signal)
    }
}

impl Default for MeanReversionStrategy {
    fn default() -> Self {
        Self::new(MeanReversionConfig::default())
    }
}

impl Strategy for MeanReversionStrategy {
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
                tracing::error!("mean_reversion analysis failed: {}", e);
                TradingSignal::hold(0.0, format!("Analysis error: {}", e)).with_source(self.name())
            }
        }
    }

    fn name(&self) -> &'static str {
        "mean_reversion"
    }

    fn regime_suitability(&self, regime: MarketRegime) -> f64 {
        match regime {
            MarketRegime::Bull => 0.4,
            MarketRegime::Bear => 0.5,
            MarketRegime::Sideways => 0.9,
        }
    }
}
