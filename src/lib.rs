// Core modules
pub mod backtest;
pub mod indicators;
pub mod llm;
pub mod manager;
pub mod models;
pub mod regime;
pub mod strategy;
pub mod tracker;
pub mod volatility;

// Re-export commonly used types
pub use manager::{AdaptiveStrategyManager, DecisionEngine, StrategyManager};
pub use models::*;
pub use strategy::Strategy;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
