use serde::Serialize;
use std::collections::HashMap;

/// Aggregate results of one backtest run
#[derive(Debug, Clone, Serialize)]
pub struct BacktestMetrics {
    pub engine: String,
    pub scenario: String,

    // P&L
    pub initial_portfolio_value: f64,
    pub final_portfolio_value: f64,
    pub total_return_pct: f64,

    // Decision statistics
    pub decisions: usize,
    pub buys: usize,
    pub sells: usize,
    pub holds: usize,

    // Round trips (a sell closing an open position)
    pub round_trips: usize,
    pub winning_round_trips: usize,
    pub win_rate_pct: f64,

    /// Ticks spent in each detected regime
    pub regime_counts: HashMap<String, usize>,

    /// Which strategy sourced each acted-on decision
    pub source_counts: HashMap<String, usize>,
}

impl BacktestMetrics {
    pub fn print_report(&self) {
        println!("\n─── {} / {} ───", self.engine, self.scenario);
        println!(
            "  Return: {:+.2}%  (${:.2} -> ${:.2})",
            self.total_return_pct, self.initial_portfolio_value, self.final_portfolio_value
        );
        println!(
            "  Decisions: {} ({} buy / {} sell / {} hold)",
            self.decisions, self.buys, self.sells, self.holds
        );
        println!(
            "  Round trips: {} ({} wins, {:.1}% win rate)",
            self.round_trips, self.winning_round_trips, self.win_rate_pct
        );

        let mut regimes: Vec<_> = self.regime_counts.iter().collect();
        regimes.sort_by(|a, b| b.1.cmp(a.1));
        let regime_line: Vec<String> =
            regimes.iter().map(|(name, n)| format!("{}={}", name, n)).collect();
        println!("  Regimes: {}", regime_line.join(", "));

        if !self.source_counts.is_empty() {
            let mut sources: Vec<_> = self.source_counts.iter().collect();
            sources.sort_by(|a, b| b.1.cmp(a.1));
            let source_line: Vec<String> =
                sources.iter().map(|(name, n)| format!("{}={}", name, n)).collect();
            println!("  Signal sources: {}", source_line.join(", "));
        }
    }
}
