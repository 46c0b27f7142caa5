// LLM analyzer boundary
//
// The strategy layer consumes these traits synchronously; production
// implementations may block and retry internally (the OpenAI client does),
// which is why they live behind this seam instead of inside the strategy.
pub mod openai;

pub use openai::{BlockingAnalyzer, OpenAiAnalyzer};

use crate::models::{LlmDecision, MarketContext, NewsSentiment};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("request failed after {retries} retries: {last_error}")]
    RetriesExhausted { retries: u32, last_error: String },
}

/// Market analyzer backed by a language model.
/// Returns a raw decision; the consuming strategy validates it.
pub trait LlmAnalyzer: Send + Sync {
    fn analyze(&self, context: &MarketContext) -> Result<LlmDecision, LlmError>;
}

/// News sentiment source for one asset
pub trait SentimentProvider: Send + Sync {
    fn sentiment(&self, asset: &str) -> Result<NewsSentiment, LlmError>;
}
