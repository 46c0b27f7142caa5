/// OpenAI-backed market analyzer
///
/// Asks a chat model for a single BUY/SELL/HOLD call on a market summary.
/// Responses must be JSON; markdown code fences are stripped before
/// parsing. Rate-limit (429), network and parse failures are retried with
/// exponential backoff up to MAX_RETRIES.
use super::{LlmAnalyzer, LlmError};
use crate::models::{LlmDecision, MarketContext};
use serde::{Deserialize, Serialize};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const MAX_TOKENS: u32 = 512;
const RATE_LIMIT_DELAY_MS: u64 = 2500;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    content: String,
}

pub struct OpenAiAnalyzer {
    api_key: String,
    client: reqwest::Client,
    model: String,
    base_url: String,
    retry_delay_ms: u64,
}

impl OpenAiAnalyzer {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            model: DEFAULT_MODEL.to_string(),
            base_url: OPENAI_API_URL.to_string(),
            retry_delay_ms: RATE_LIMIT_DELAY_MS,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point at a different endpoint (test servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the base backoff delay (test servers)
    pub fn with_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.retry_delay_ms = delay_ms;
        self
    }

    /// Request one trading decision for the given market summary
    pub async fn analyze_market(&self, context: &MarketContext) -> Result<LlmDecision, LlmError> {
        let prompt = build_prompt(context);

        let mut retry_count: u32 = 0;
        let mut last_error = String::new();

        loop {
            if retry_count > 0 {
                // Exponential backoff: 2.5s, 5s, 10s at the default delay
                let delay_ms = self.retry_delay_ms * 2_u64.pow(retry_count - 1);
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
            }

            let request = ChatRequest {
                model: self.model.clone(),
                max_tokens: MAX_TOKENS,
                temperature: 0.0, // Deterministic responses
                messages: vec![
                    Message {
                        role: "system".to_string(),
                        content: "You are a professional cryptocurrency swing trader. \
                                  Analyze market conditions and respond with valid JSON only, \
                                  no markdown formatting."
                            .to_string(),
                    },
                    Message {
                        role: "user".to_string(),
                        content: prompt.clone(),
                    },
                ],
            };

            let response = match self
                .client
                .post(&self.base_url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&request)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_error = format!("network error: {}", e);
                    retry_count += 1;
                    if retry_count >= MAX_RETRIES {
                        return Err(LlmError::RetriesExhausted {
                            retries: MAX_RETRIES,
                            last_error,
                        });
                    }
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                last_error = format!("API error {}: {}", status, body);

                // Retry on rate limits, fail fast on everything else
                if status.as_u16() == 429 {
                    retry_count += 1;
                    if retry_count >= MAX_RETRIES {
                        return Err(LlmError::RetriesExhausted {
                            retries: MAX_RETRIES,
                            last_error,
                        });
                    }
                    continue;
                }

                return Err(LlmError::Api {
                    status: status.as_u16(),
                    body,
                });
            }

            let chat: ChatResponse = match response.json().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = format!("JSON decode error: {}", e);
                    retry_count += 1;
                    if retry_count >= MAX_RETRIES {
                        return Err(LlmError::RetriesExhausted {
                            retries: MAX_RETRIES,
                            last_error,
                        });
                    }
                    continue;
                }
            };

            let text = match chat.choices.first() {
                Some(choice) => strip_code_fences(&choice.message.content),
                None => {
                    return Err(LlmError::Parse("response contained no choices".to_string()))
                }
            };

            match serde_json::from_str::<LlmDecision>(&text) {
                Ok(decision) => {
                    tracing::debug!(
                        "LLM decision for {}: {} ({:.0})",
                        context.product_id,
                        decision.decision,
                        decision.confidence
                    );
                    return Ok(decision);
                }
                Err(e) => {
                    last_error = format!("JSON parse error: {} (text: {})", e, text);
                    retry_count += 1;
                    if retry_count >= MAX_RETRIES {
                        return Err(LlmError::RetriesExhausted {
                            retries: MAX_RETRIES,
                            last_error,
                        });
                    }
                }
            }
        }
    }
}

/// Strip markdown code blocks (```json ... ``` or ``` ... ```)
fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
            .to_string()
    } else {
        trimmed.to_string()
    }
}

fn build_prompt(context: &MarketContext) -> String {
    format!(
        r#"You are analyzing {} for a swing-trading decision.

**MARKET DATA:**
- Current price: ${:.4}
- 24H change: {:+.2}%
- 7D change: {:+.2}%
- RSI(14): {:.1}
- MACD histogram: {:+.4}
- Bollinger band width: {:.2}%
- Volume vs average: {:.2}x

**DECISION: BUY, SELL or HOLD?**

Consider momentum, exhaustion and volatility. Be decisive; HOLD is the
right call when conditions are mixed.

Respond ONLY with valid JSON (no markdown, no code blocks):

{{
  "decision": "BUY|SELL|HOLD",
  "confidence": 0-100,
  "reasoning": "Brief explanation (1-2 sentences)"
}}
"#,
        context.product_id,
        context.current_price,
        context.price_change_24h,
        context.price_change_7d,
        context.rsi,
        context.macd_histogram,
        context.bb_width_pct,
        context.volume_ratio,
    )
}

/// Bridges the async client into the synchronous strategy path.
///
/// Owns a current-thread runtime; `analyze` must not be called from inside
/// another Tokio runtime (the strategies and managers are synchronous, so
/// this only matters if a caller embeds the manager in an async task;
/// use `spawn_blocking` there).
pub struct BlockingAnalyzer {
    inner: OpenAiAnalyzer,
    runtime: tokio::runtime::Runtime,
}

impl BlockingAnalyzer {
    pub fn new(inner: OpenAiAnalyzer) -> crate::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self { inner, runtime })
    }
}

impl LlmAnalyzer for BlockingAnalyzer {
    fn analyze(&self, context: &MarketContext) -> Result<LlmDecision, LlmError> {
        self.runtime.block_on(self.inner.analyze_market(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context() -> MarketContext {
        MarketContext {
            product_id: "SOL-USD".to_string(),
            current_price: 150.0,
            price_change_24h: 2.5,
            price_change_7d: 8.0,
            rsi: 62.0,
            macd_histogram: 0.4,
            bb_width_pct: 3.1,
            volume_ratio: 1.4,
        }
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(
            strip_code_fences("```json\n{\"a\": 1}\n```"),
            "{\"a\": 1}"
        );
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_prompt_mentions_product_and_schema() {
        let prompt = build_prompt(&test_context());
        assert!(prompt.contains("SOL-USD"));
        assert!(prompt.contains("\"decision\""));
        assert!(prompt.contains("BUY|SELL|HOLD"));
    }

    #[tokio::test]
    async fn test_analyze_market_parses_decision() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!({
            "choices": [{
                "message": {
                    "content": "{\"decision\": \"BUY\", \"confidence\": 72, \"reasoning\": \"momentum building\"}"
                }
            }]
        });
        let mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let analyzer =
            OpenAiAnalyzer::new("test-key".to_string()).with_base_url(server.url());
        let decision = analyzer.analyze_market(&test_context()).await.unwrap();

        assert_eq!(decision.decision, "BUY");
        assert_eq!(decision.confidence, 72.0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_analyze_market_strips_fences() {
        let mut server = mockito::Server::new_async().await;
        let content = "```json\n{\"decision\": \"HOLD\", \"confidence\": 55, \"reasoning\": \"mixed\"}\n```";
        let body = serde_json::json!({
            "choices": [{"message": {"content": content}}]
        });
        server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let analyzer =
            OpenAiAnalyzer::new("test-key".to_string()).with_base_url(server.url());
        let decision = analyzer.analyze_market(&test_context()).await.unwrap();

        assert_eq!(decision.decision, "HOLD");
    }

    #[tokio::test]
    async fn test_analyze_market_non_retryable_error() {
        let mut server = mockito::Server::new_async().await;
        // 401 should fail immediately, not retry
        let mock = server
            .mock("POST", "/")
            .with_status(401)
            .with_body("unauthorized")
            .expect(1)
            .create_async()
            .await;

        let analyzer =
            OpenAiAnalyzer::new("bad-key".to_string()).with_base_url(server.url());
        let err = analyzer.analyze_market(&test_context()).await.unwrap_err();

        assert!(matches!(err, LlmError::Api { status: 401, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_analyze_market_retries_bad_json() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!({
            "choices": [{"message": {"content": "not json at all"}}]
        });
        let mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .expect(MAX_RETRIES as usize)
            .create_async()
            .await;

        let analyzer = OpenAiAnalyzer::new("test-key".to_string())
            .with_base_url(server.url())
            .with_retry_delay_ms(10);
        let err = analyzer.analyze_market(&test_context()).await.unwrap_err();

        assert!(matches!(err, LlmError::RetriesExhausted { .. }));
        mock.assert_async().await;
    }
}
