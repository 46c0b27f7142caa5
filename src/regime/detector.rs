/// Market regime classifiers.
///
/// Two classifiers coexist: the coarse bull/bear/sideways scorer used by
/// the weighted-vote manager, and the enhanced four-way detector used by
/// the adaptive manager. Both are pure functions of the two payloads and
/// both degrade to their neutral regime on any malformed input.
use serde_json::{Map, Value};

/// Coarse regime used by the weighted-vote manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketRegime {
    Bull,
    Bear,
    Sideways,
}

impl MarketRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketRegime::Bull => "bull",
            MarketRegime::Bear => "bear",
            MarketRegime::Sideways => "sideways",
        }
    }
}

/// Enhanced regime used by the adaptive manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdaptiveRegime {
    Trending,
    Ranging,
    Volatile,
    BearRanging,
}

impl AdaptiveRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdaptiveRegime::Trending => "trending",
            AdaptiveRegime::Ranging => "ranging",
            AdaptiveRegime::Volatile => "volatile",
            AdaptiveRegime::BearRanging => "bear_ranging",
        }
    }
}

// Scoring thresholds for the coarse classifier
const STRONG_TREND_24H: f64 = 3.0;
const STRONG_TREND_5D: f64 = 10.0;
const MODERATE_TREND_24H: f64 = 1.0;
const MODERATE_TREND_5D: f64 = 5.0;

/// Classify the coarse market regime by summing directional evidence:
/// ±2 for a strong trend (|24h| > 3% and |5d| > 10%), ±1 for a moderate
/// trend, ±1 for RSI above 60 / below 40, ±1 for a MACD histogram beyond
/// ±0.2. Score >= 2 is bull, <= -2 is bear, anything else sideways.
pub fn classify_regime(indicators: &Value, market: &Value) -> MarketRegime {
    let (Some(ind), Some(mkt)) = (indicators.as_object(), market.as_object()) else {
        return MarketRegime::Sideways;
    };

    let c24 = change(mkt, "24h");
    let c5d = change(mkt, "5d");

    let mut score: i32 = 0;

    if c24 > STRONG_TREND_24H && c5d > STRONG_TREND_5D {
        score += 2;
    } else if c24 < -STRONG_TREND_24H && c5d < -STRONG_TREND_5D {
        score -= 2;
    } else if c24 > MODERATE_TREND_24H && c5d > MODERATE_TREND_5D {
        score += 1;
    } else if c24 < -MODERATE_TREND_24H && c5d < -MODERATE_TREND_5D {
        score -= 1;
    }

    if let Some(rsi) = num(ind, "rsi") {
        if rsi > 60.0 {
            score += 1;
        } else if rsi < 40.0 {
            score -= 1;
        }
    }

    if let Some(hist) = num(ind, "macd_histogram") {
        if hist > 0.2 {
            score += 1;
        } else if hist < -0.2 {
            score -= 1;
        }
    }

    if score >= 2 {
        MarketRegime::Bull
    } else if score <= -2 {
        MarketRegime::Bear
    } else {
        MarketRegime::Sideways
    }
}

// Enhanced classifier thresholds
const BEAR_OVERRIDE_7D: f64 = -5.0;
const QUIET_24H: f64 = 1.5;
const BEAR_QUIET_BB_WIDTH: f64 = 3.0;
const FAST_MOVE_24H: f64 = 4.0;
const FAST_MOVE_5D: f64 = 8.0;
const FAST_MOVE_BB_WIDTH: f64 = 4.0;
const RANGING_BB_WIDTH: f64 = 2.0;
const WIDE_BB_WIDTH: f64 = 5.0;

/// Enhanced four-way regime detection for the adaptive manager.
///
/// The bear-market override runs first: a 7-day drop past -5% classifies
/// as bear_ranging when the last day is quiet and the bands are tight,
/// volatile otherwise. After that, fast moves split into trending vs
/// volatile on band width, quiet markets are ranging, and very wide bands
/// are volatile on their own. Anything unreadable falls back to ranging.
pub fn detect_market_regime_enhanced(indicators: &Value, market: &Value) -> AdaptiveRegime {
    let (Some(ind), Some(mkt)) = (indicators.as_object(), market.as_object()) else {
        return AdaptiveRegime::Ranging;
    };

    let c24 = change(mkt, "24h");
    let c5d = change(mkt, "5d");
    let c7d = change(mkt, "7d");
    let bb_width = bollinger_width_pct(ind);

    if c7d < BEAR_OVERRIDE_7D {
        // Conservative fallback: an unreadable band width in a bear market
        // is treated as volatile, not quiet
        return match bb_width {
            Some(width) if c24.abs() < QUIET_24H && width < BEAR_QUIET_BB_WIDTH => {
                AdaptiveRegime::BearRanging
            }
            _ => AdaptiveRegime::Volatile,
        };
    }

    let Some(width) = bb_width else {
        return AdaptiveRegime::Ranging;
    };

    if c24.abs() > FAST_MOVE_24H || c5d.abs() > FAST_MOVE_5D {
        if width > FAST_MOVE_BB_WIDTH {
            AdaptiveRegime::Volatile
        } else {
            AdaptiveRegime::Trending
        }
    } else if c24.abs() < QUIET_24H && width < RANGING_BB_WIDTH {
        AdaptiveRegime::Ranging
    } else if width > WIDE_BB_WIDTH {
        AdaptiveRegime::Volatile
    } else {
        AdaptiveRegime::Ranging
    }
}

fn num(map: &Map<String, Value>, key: &str) -> Option<f64> {
    map.get(key).and_then(Value::as_f64).filter(|v| v.is_finite())
}

fn change(market: &Map<String, Value>, window: &str) -> f64 {
    market
        .get("price_changes")
        .and_then(Value::as_object)
        .and_then(|changes| num(changes, window))
        .unwrap_or(0.0)
}

/// Band width as a percent of the middle band; None when the bands are
/// missing or the middle band is zero
fn bollinger_width_pct(ind: &Map<String, Value>) -> Option<f64> {
    let upper = num(ind, "bb_upper")?;
    let lower = num(ind, "bb_lower")?;
    let middle = num(ind, "bb_middle")?;
    if middle == 0.0 {
        return None;
    }
    Some((upper - lower) / middle * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn market(c24: f64, c5d: f64, c7d: f64) -> Value {
        json!({
            "price": 100.0,
            "price_changes": {"24h": c24, "5d": c5d, "7d": c7d},
        })
    }

    fn indicators(rsi: f64, hist: f64, bb_width_pct: f64) -> Value {
        // Middle band at 100 so width_pct maps directly to upper-lower
        json!({
            "rsi": rsi,
            "macd_histogram": hist,
            "bb_upper": 100.0 + bb_width_pct / 2.0,
            "bb_middle": 100.0,
            "bb_lower": 100.0 - bb_width_pct / 2.0,
        })
    }

    #[test]
    fn test_classify_strong_bull() {
        let regime = classify_regime(&indicators(65.0, 0.5, 4.0), &market(4.0, 12.0, 15.0));
        assert_eq!(regime, MarketRegime::Bull);
    }

    #[test]
    fn test_classify_strong_bear() {
        let regime = classify_regime(&indicators(35.0, -0.5, 4.0), &market(-4.0, -12.0, -15.0));
        assert_eq!(regime, MarketRegime::Bear);
    }

    #[test]
    fn test_classify_mixed_is_sideways() {
        // Moderate uptrend but bearish oscillators cancel out
        let regime = classify_regime(&indicators(38.0, -0.3, 2.0), &market(2.0, 6.0, 6.0));
        assert_eq!(regime, MarketRegime::Sideways);
    }

    #[test]
    fn test_classify_malformed_defaults_sideways() {
        assert_eq!(
            classify_regime(&json!(42.0), &market(5.0, 12.0, 15.0)),
            MarketRegime::Sideways
        );
        assert_eq!(
            classify_regime(&indicators(65.0, 0.5, 4.0), &json!("oops")),
            MarketRegime::Sideways
        );
    }

    #[test]
    fn test_enhanced_bear_ranging() {
        // 7d past -5%, quiet day, tight bands
        let regime =
            detect_market_regime_enhanced(&indicators(45.0, 0.0, 0.67), &market(1.0, 2.0, -6.0));
        assert_eq!(regime, AdaptiveRegime::BearRanging);
    }

    #[test]
    fn test_enhanced_bear_volatile_fallback() {
        // Bear override with a loud day goes volatile
        let regime =
            detect_market_regime_enhanced(&indicators(45.0, 0.0, 0.67), &market(3.0, 2.0, -6.0));
        assert_eq!(regime, AdaptiveRegime::Volatile);

        // Bear override with unreadable bands also goes volatile
        let regime = detect_market_regime_enhanced(&json!({"rsi": 45.0}), &market(1.0, 2.0, -6.0));
        assert_eq!(regime, AdaptiveRegime::Volatile);
    }

    #[test]
    fn test_enhanced_trending_vs_volatile() {
        let fast = market(5.0, 3.0, 2.0);
        assert_eq!(
            detect_market_regime_enhanced(&indicators(60.0, 0.4, 3.0), &fast),
            AdaptiveRegime::Trending
        );
        assert_eq!(
            detect_market_regime_enhanced(&indicators(60.0, 0.4, 6.0), &fast),
            AdaptiveRegime::Volatile
        );
    }

    #[test]
    fn test_enhanced_quiet_is_ranging() {
        let regime =
            detect_market_regime_enhanced(&indicators(50.0, 0.0, 1.2), &market(0.5, 1.0, 1.0));
        assert_eq!(regime, AdaptiveRegime::Ranging);
    }

    #[test]
    fn test_enhanced_wide_bands_volatile() {
        // Not fast, not quiet, but bands blown out
        let regime =
            detect_market_regime_enhanced(&indicators(50.0, 0.0, 6.0), &market(2.0, 3.0, 1.0));
        assert_eq!(regime, AdaptiveRegime::Volatile);
    }

    #[test]
    fn test_enhanced_malformed_defaults_ranging() {
        assert_eq!(
            detect_market_regime_enhanced(&json!(null), &market(5.0, 3.0, 2.0)),
            AdaptiveRegime::Ranging
        );
    }

    #[test]
    fn test_enhanced_deterministic() {
        let ind = indicators(55.0, 0.1, 2.5);
        let mkt = market(2.0, 4.0, -1.0);
        let first = detect_market_regime_enhanced(&ind, &mkt);
        let second = detect_market_regime_enhanced(&ind, &mkt);
        assert_eq!(first, second);
    }
}
