// Performance tracking module
//
// The managers record every combined decision through this sink so the
// LLM-vs-rule-based comparison can run offline. Tracker failures are
// logged and swallowed by the caller; recording must never affect the
// returned signal.
use crate::models::{Action, TradingSignal};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

pub trait PerformanceTracker: Send + Sync {
    fn record_decision(
        &self,
        product_id: &str,
        strategy_signals: &HashMap<String, TradingSignal>,
        final_decision: &TradingSignal,
        current_price: f64,
    ) -> crate::Result<()>;
}

/// One strategy's vote inside a recorded decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyVote {
    pub action: Action,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub product_id: String,
    pub price: f64,
    pub final_action: Action,
    pub final_confidence: f64,
    pub source_strategy: Option<String>,
    pub votes: HashMap<String, StrategyVote>,
}

/// In-memory tracker; the process owns the full decision history
#[derive(Default)]
pub struct InMemoryTracker {
    records: Mutex<Vec<DecisionRecord>>,
}

impl InMemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> Vec<DecisionRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Aggregate view for dashboards: action distribution plus how often
    /// the LLM vote agreed with the final decision
    pub fn summary(&self) -> serde_json::Value {
        let records = self.records();

        let mut action_counts: HashMap<&'static str, usize> = HashMap::new();
        for record in &records {
            *action_counts.entry(record.final_action.as_str()).or_default() += 1;
        }

        let with_llm: Vec<&DecisionRecord> = records
            .iter()
            .filter(|r| r.votes.contains_key("llm_strategy"))
            .collect();
        let llm_agreement_pct = if with_llm.is_empty() {
            None
        } else {
            let agreed = with_llm
                .iter()
                .filter(|r| r.votes["llm_strategy"].action == r.final_action)
                .count();
            Some(agreed as f64 / with_llm.len() as f64 * 100.0)
        };

        json!({
            "total_decisions": records.len(),
            "action_counts": action_counts,
            "llm_agreement_pct": llm_agreement_pct,
        })
    }
}

impl PerformanceTracker for InMemoryTracker {
    fn record_decision(
        &self,
        product_id: &str,
        strategy_signals: &HashMap<String, TradingSignal>,
        final_decision: &TradingSignal,
        current_price: f64,
    ) -> crate::Result<()> {
        let votes = strategy_signals
            .iter()
            .map(|(name, signal)| {
                (
                    name.clone(),
                    StrategyVote {
                        action: signal.action,
                        confidence: signal.confidence,
                    },
                )
            })
            .collect();

        let record = DecisionRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            product_id: product_id.to_string(),
            price: current_price,
            final_action: final_decision.action,
            final_confidence: final_decision.confidence,
            source_strategy: final_decision.source_strategy.clone(),
            votes,
        };

        let mut records = self
            .records
            .lock()
            .map_err(|_| "tracker mutex poisoned")?;
        records.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(llm_action: Action) -> HashMap<String, TradingSignal> {
        let mut map = HashMap::new();
        map.insert(
            "momentum".to_string(),
            TradingSignal::new(Action::Buy, 70.0, "up"),
        );
        map.insert(
            "llm_strategy".to_string(),
            TradingSignal::new(llm_action, 60.0, "llm says"),
        );
        map
    }

    #[test]
    fn test_record_and_summary() {
        let tracker = InMemoryTracker::new();
        let buy = TradingSignal::new(Action::Buy, 75.0, "combined").with_source("momentum");
        let hold = TradingSignal::hold(40.0, "combined");

        tracker
            .record_decision("SOL-USD", &signals(Action::Buy), &buy, 150.0)
            .unwrap();
        tracker
            .record_decision("SOL-USD", &signals(Action::Sell), &hold, 151.0)
            .unwrap();

        assert_eq!(tracker.len(), 2);

        let summary = tracker.summary();
        assert_eq!(summary["total_decisions"], 2);
        assert_eq!(summary["action_counts"]["BUY"], 1);
        assert_eq!(summary["action_counts"]["HOLD"], 1);
        // LLM agreed on the first decision only
        assert_eq!(summary["llm_agreement_pct"], 50.0);
    }

    #[test]
    fn test_summary_without_llm_votes() {
        let tracker = InMemoryTracker::new();
        let mut rule_only = signals(Action::Buy);
        rule_only.remove("llm_strategy");

        tracker
            .record_decision(
                "SOL-USD",
                &rule_only,
                &TradingSignal::new(Action::Buy, 70.0, "combined"),
                150.0,
            )
            .unwrap();

        assert_eq!(tracker.summary()["llm_agreement_pct"], serde_json::Value::Null);
    }

    #[test]
    fn test_records_capture_votes() {
        let tracker = InMemoryTracker::new();
        tracker
            .record_decision(
                "SOL-USD",
                &signals(Action::Hold),
                &TradingSignal::hold(50.0, "combined"),
                150.0,
            )
            .unwrap();

        let records = tracker.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].votes["momentum"].action, Action::Buy);
        assert_eq!(records[0].product_id, "SOL-USD");
    }
}
