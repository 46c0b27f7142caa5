use crate::indicators::{calculate_bollinger, calculate_macd, calculate_rsi, calculate_sma};
use crate::models::Candle;
use serde_json::{json, Value};

// Standard periods used across the pipeline
const RSI_PERIOD: usize = 14;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;
const BB_PERIOD: usize = 20;
const BB_STD_DEV: f64 = 2.0;
const RECENT_PRICES: usize = 48;

/// Minimum candles for a full indicator snapshot (MACD is the longest)
pub const MIN_SNAPSHOT_CANDLES: usize = MACD_SLOW + MACD_SIGNAL;

/// Build the `technical_indicators` payload from a candle window.
///
/// This is the backtest's stand-in for the external indicator pipeline:
/// live operation receives the same shape from upstream. Indicators that
/// cannot be computed are omitted from the object, which downstream
/// strategies treat as an analysis error for the rules that need them.
pub fn indicator_snapshot(candles: &[Candle]) -> Value {
    let prices: Vec<f64> = candles.iter().map(|c| c.close).collect();

    let mut map = serde_json::Map::new();

    if let Some(rsi) = calculate_rsi(&prices, RSI_PERIOD) {
        map.insert("rsi".to_string(), json!(rsi));
    }
    if let Some(macd) = calculate_macd(&prices, MACD_FAST, MACD_SLOW, MACD_SIGNAL) {
        map.insert("macd".to_string(), json!(macd.macd));
        map.insert("macd_signal".to_string(), json!(macd.signal));
        map.insert("macd_histogram".to_string(), json!(macd.histogram));
    }
    if let Some(bands) = calculate_bollinger(&prices, BB_PERIOD, BB_STD_DEV) {
        map.insert("bb_upper".to_string(), json!(bands.upper));
        map.insert("bb_middle".to_string(), json!(bands.middle));
        map.insert("bb_lower".to_string(), json!(bands.lower));
    }
    if let Some(sma) = calculate_sma(&prices, BB_PERIOD) {
        map.insert("sma_20".to_string(), json!(sma));
    }

    Value::Object(map)
}

/// Build the `market_data` payload from a candle window (hourly candles).
///
/// Price changes are percent returns against fixed hourly offsets; windows
/// that extend past the available history report 0.0, matching what the
/// live pipeline emits while still warming up.
pub fn market_snapshot(candles: &[Candle]) -> Value {
    let last = match candles.last() {
        Some(c) => c,
        None => return json!({}),
    };

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
    let avg_volume = volumes.iter().sum::<f64>() / volumes.len() as f64;

    let recent_start = closes.len().saturating_sub(RECENT_PRICES);

    json!({
        "price": last.close,
        "volume": last.volume,
        "avg_volume": avg_volume,
        "price_changes": {
            "1h": pct_change(&closes, 1),
            "4h": pct_change(&closes, 4),
            "24h": pct_change(&closes, 24),
            "5d": pct_change(&closes, 120),
            "7d": pct_change(&closes, 168),
        },
        "recent_prices": closes[recent_start..].to_vec(),
    })
}

fn pct_change(closes: &[f64], hours_back: usize) -> f64 {
    if closes.len() <= hours_back {
        return 0.0;
    }
    let then = closes[closes.len() - 1 - hours_back];
    if then == 0.0 {
        return 0.0;
    }
    (closes[closes.len() - 1] - then) / then * 100.0
}
