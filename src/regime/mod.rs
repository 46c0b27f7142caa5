// Market regime classification module
pub mod detector;

pub use detector::{classify_regime, detect_market_regime_enhanced, AdaptiveRegime, MarketRegime};
