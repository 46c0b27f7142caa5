// Volatility analyzer boundary
//
// Supplies additive strategy-weight deltas to the weighted-vote manager.
// Deltas are small and bounded; the manager renormalizes after applying
// them, so an aggressive analyzer cannot dominate the weight table.
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct VolatilityReport {
    /// Additive weight deltas keyed by strategy registry name
    pub strategy_adjustments: HashMap<String, f64>,
    /// Volatility bucket: low / normal / high / extreme
    pub category: String,
    /// Per-period return standard deviation, percent
    pub score: f64,
}

pub trait VolatilityAnalyzer: Send + Sync {
    fn analyze(
        &self,
        product_id: &str,
        prices: &[f64],
        periods: usize,
    ) -> crate::Result<VolatilityReport>;
}

/// Realized-volatility analyzer over trailing percent returns
#[derive(Debug, Clone)]
pub struct RealizedVolatilityAnalyzer {
    /// Cap on the magnitude of any single weight delta
    pub max_adjustment: f64,
}

impl Default for RealizedVolatilityAnalyzer {
    fn default() -> Self {
        Self { max_adjustment: 0.05 }
    }
}

// Category boundaries on per-period return stdev, percent
const LOW_VOL_PCT: f64 = 0.5;
const NORMAL_VOL_PCT: f64 = 1.5;
const HIGH_VOL_PCT: f64 = 3.0;

impl VolatilityAnalyzer for RealizedVolatilityAnalyzer {
    fn analyze(
        &self,
        product_id: &str,
        prices: &[f64],
        periods: usize,
    ) -> crate::Result<VolatilityReport> {
        if periods < 2 || prices.len() < periods + 1 {
            return Err(format!(
                "need at least {} prices for volatility, got {}",
                periods + 1,
                prices.len()
            )
            .into());
        }

        let window = &prices[prices.len() - periods - 1..];
        let mut returns = Vec::with_capacity(periods);
        for pair in window.windows(2) {
            if pair[0] == 0.0 {
                return Err("zero price in volatility window".into());
            }
            returns.push((pair[1] - pair[0]) / pair[0] * 100.0);
        }

        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance =
            returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
        let vol_pct = variance.sqrt();

        let category = if vol_pct < LOW_VOL_PCT {
            "low"
        } else if vol_pct < NORMAL_VOL_PCT {
            "normal"
        } else if vol_pct < HIGH_VOL_PCT {
            "high"
        } else {
            "extreme"
        };

        // Calm tape favors the trend riders; turbulent tape favors fading
        // extremes and deferring to the LLM's broader read
        let unit = self.max_adjustment;
        let adjustments: Vec<(&str, f64)> = match category {
            "low" => vec![
                ("trend_following", unit * 0.6),
                ("momentum", unit * 0.4),
                ("mean_reversion", -unit * 0.6),
                ("llm_strategy", -unit * 0.4),
            ],
            "high" => vec![
                ("mean_reversion", unit * 0.6),
                ("llm_strategy", unit * 0.4),
                ("momentum", -unit * 0.6),
                ("trend_following", -unit * 0.4),
            ],
            "extreme" => vec![
                ("mean_reversion", unit),
                ("llm_strategy", unit * 0.6),
                ("momentum", -unit),
                ("trend_following", -unit * 0.6),
            ],
            _ => vec![],
        };

        tracing::debug!(
            "{} realized vol {:.2}%/period ({})",
            product_id,
            vol_pct,
            category
        );

        Ok(VolatilityReport {
            strategy_adjustments: adjustments
                .into_iter()
                .map(|(name, delta)| (name.to_string(), delta))
                .collect(),
            category: category.to_string(),
            score: vol_pct,
        })
    }
}
