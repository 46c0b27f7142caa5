use crate::models::Candle;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Market scenario types for synthetic data generation.
/// Shaped so that every regime branch of both classifiers gets exercised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketScenario {
    /// Steady uptrend with noise (~+0.15% hourly drift)
    Uptrend,
    /// Steady downtrend with noise (~-0.15% hourly drift)
    Downtrend,
    /// Mean-reverting chop around the base price
    Sideways,
    /// Large swings with occasional gap moves
    Volatile,
    /// Slow, quiet bleed: the bear_ranging shape
    BearGrind,
}

impl MarketScenario {
    pub const ALL: [MarketScenario; 5] = [
        MarketScenario::Uptrend,
        MarketScenario::Downtrend,
        MarketScenario::Sideways,
        MarketScenario::Volatile,
        MarketScenario::BearGrind,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MarketScenario::Uptrend => "uptrend",
            MarketScenario::Downtrend => "downtrend",
            MarketScenario::Sideways => "sideways",
            MarketScenario::Volatile => "volatile",
            MarketScenario::BearGrind => "bear_grind",
        }
    }

    pub fn parse(s: &str) -> Option<MarketScenario> {
        match s.to_lowercase().as_str() {
            "uptrend" => Some(MarketScenario::Uptrend),
            "downtrend" => Some(MarketScenario::Downtrend),
            "sideways" => Some(MarketScenario::Sideways),
            "volatile" => Some(MarketScenario::Volatile),
            "bear_grind" | "beargrind" => Some(MarketScenario::BearGrind),
            _ => None,
        }
    }
}

/// Generates synthetic hourly price data for backtesting
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    base_volume: f64,
}

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 150.0,
            base_volume: 1_000_000.0,
        }
    }

    /// Generate hourly candles for a market scenario
    pub fn generate(&mut self, scenario: MarketScenario, num_candles: usize) -> Vec<Candle> {
        let start_time = Utc::now() - Duration::hours(num_candles as i64);

        let mut price = self.base_price;
        let mut candles = Vec::with_capacity(num_candles);

        for i in 0..num_candles {
            let (drift_pct, noise_pct) = match scenario {
                MarketScenario::Uptrend => (0.15, 0.4),
                MarketScenario::Downtrend => (-0.15, 0.4),
                MarketScenario::Sideways => {
                    // Pull back toward the base price
                    let reversion = (self.base_price - price) / self.base_price * 8.0;
                    (reversion, 0.3)
                }
                MarketScenario::Volatile => (0.0, 1.8),
                MarketScenario::BearGrind => (-0.05, 0.15),
            };

            let mut change_pct = drift_pct + self.rng.gen_range(-noise_pct..noise_pct);

            // Volatile markets gap occasionally
            if scenario == MarketScenario::Volatile && self.rng.gen_bool(0.05) {
                let gap = self.rng.gen_range(2.0..4.0);
                change_pct += if self.rng.gen_bool(0.5) { gap } else { -gap };
            }

            let open = price;
            price *= 1.0 + change_pct / 100.0;
            let close = price;

            let wick_pct = self.rng.gen_range(0.0..noise_pct / 2.0) / 100.0;
            let high = open.max(close) * (1.0 + wick_pct);
            let low = open.min(close) * (1.0 - wick_pct);

            // Volume follows the size of the move
            let volume = self.base_volume
                * (0.7 + self.rng.gen_range(0.0..0.6) + change_pct.abs() * 0.3);

            candles.push(self.candle(start_time, i, open, high, low, close, volume));
        }

        candles
    }

    #[allow(clippy::too_many_arguments)]
    fn candle(
        &self,
        start_time: DateTime<Utc>,
        index: usize,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Candle {
        Candle {
            token: "SYNTH".to_string(),
            timestamp: start_time + Duration::hours(index as i64),
            open,
            high,
            low,
            close,
            volume,
        }
    }
}
