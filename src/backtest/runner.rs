use crate::backtest::metrics::BacktestMetrics;
use crate::indicators::snapshot::{indicator_snapshot, market_snapshot, MIN_SNAPSHOT_CANDLES};
use crate::manager::DecisionEngine;
use crate::models::{Action, Candle, Portfolio};
use std::collections::HashMap;

// Trailing window handed to the snapshot builders each tick; long enough
// for the 7d price change, short enough to keep replay linear
const WINDOW_CANDLES: usize = 200;

// Fraction of cash committed per BUY before the position multiplier
const BASE_POSITION_FRACTION: f64 = 0.25;

/// Replays a candle series row-by-row through a decision engine.
///
/// Each tick rebuilds the market and indicator payloads from the trailing
/// window, exactly as live operation would receive them, then applies a
/// simple cash/position bookkeeping loop to the returned signal. The
/// engine's decision logic is the thing under test; the bookkeeping is
/// deliberately plain.
pub struct BacktestRunner {
    initial_portfolio_value: f64,
    warmup_candles: usize,
}

impl BacktestRunner {
    pub fn new(initial_portfolio_value: f64) -> Self {
        Self {
            initial_portfolio_value,
            warmup_candles: MIN_SNAPSHOT_CANDLES.max(48),
        }
    }

    pub fn with_warmup(mut self, warmup_candles: usize) -> Self {
        self.warmup_candles = warmup_candles.max(MIN_SNAPSHOT_CANDLES);
        self
    }

    pub fn run(
        &self,
        engine: &mut dyn DecisionEngine,
        candles: &[Candle],
        scenario: &str,
    ) -> crate::Result<BacktestMetrics> {
        if candles.len() <= self.warmup_candles {
            return Err(format!(
                "not enough candles for backtest: need more than {}, got {}",
                self.warmup_candles,
                candles.len()
            )
            .into());
        }

        tracing::info!(
            "backtest start: {} candles, engine {}, scenario {}",
            candles.len(),
            engine.engine_name(),
            scenario
        );

        let mut cash = self.initial_portfolio_value;
        let mut quantity = 0.0_f64;
        let mut entry_price: Option<f64> = None;

        let mut buys = 0usize;
        let mut sells = 0usize;
        let mut holds = 0usize;
        let mut round_trips = 0usize;
        let mut winning_round_trips = 0usize;
        let mut regime_counts: HashMap<String, usize> = HashMap::new();
        let mut source_counts: HashMap<String, usize> = HashMap::new();

        for i in self.warmup_candles..candles.len() {
            let window_start = (i + 1).saturating_sub(WINDOW_CANDLES);
            let window = &candles[window_start..=i];
            let price = candles[i].close;

            let market = market_snapshot(window);
            let indicators = indicator_snapshot(window);
            let portfolio = Portfolio {
                cash,
                quantity,
                entry_price,
            };

            let signal = engine.get_combined_signal(&market, &indicators, &portfolio);
            *regime_counts.entry(engine.regime_label().to_string()).or_default() += 1;

            match signal.action {
                Action::Buy => {
                    buys += 1;
                    if cash > 0.0 {
                        let fraction =
                            (BASE_POSITION_FRACTION * signal.position_size_multiplier).min(1.0);
                        let spend = cash * fraction;
                        quantity += spend / price;
                        cash -= spend;
                        entry_price.get_or_insert(price);
                        if let Some(source) = &signal.source_strategy {
                            *source_counts.entry(source.clone()).or_default() += 1;
                        }
                    }
                }
                Action::Sell => {
                    sells += 1;
                    if quantity > 0.0 {
                        cash += quantity * price;
                        round_trips += 1;
                        if entry_price.map_or(false, |entry| price > entry) {
                            winning_round_trips += 1;
                        }
                        quantity = 0.0;
                        entry_price = None;
                        if let Some(source) = &signal.source_strategy {
                            *source_counts.entry(source.clone()).or_default() += 1;
                        }
                    }
                }
                Action::Hold => holds += 1,
            }
        }

        let last_price = candles[candles.len() - 1].close;
        let final_value = cash + quantity * last_price;
        let decisions = buys + sells + holds;

        let win_rate_pct = if round_trips > 0 {
            winning_round_trips as f64 / round_trips as f64 * 100.0
        } else {
            0.0
        };

        Ok(BacktestMetrics {
            engine: engine.engine_name().to_string(),
            scenario: scenario.to_string(),
            initial_portfolio_value: self.initial_portfolio_value,
            final_portfolio_value: final_value,
            total_return_pct: (final_value - self.initial_portfolio_value)
                / self.initial_portfolio_value
                * 100.0,
            decisions,
            buys,
            sells,
            holds,
            round_trips,
            winning_round_trips,
            win_rate_pct,
            regime_counts,
            source_counts,
        })
    }
}
