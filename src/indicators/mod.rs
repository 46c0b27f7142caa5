// Technical indicators module
// Implements RSI, MA, MACD, Bollinger Bands for technical analysis

pub mod bollinger;
pub mod macd;
pub mod moving_average;
pub mod rsi;
pub mod snapshot;

pub use bollinger::{calculate_bollinger, BollingerBands};
pub use macd::{calculate_macd, MacdOutput};
pub use moving_average::{calculate_ema, calculate_sma};
pub use rsi::calculate_rsi;
pub use snapshot::{indicator_snapshot, market_snapshot};
