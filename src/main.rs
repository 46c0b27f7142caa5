use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strategybot::backtest::{BacktestMetrics, BacktestRunner, MarketScenario, SyntheticDataGenerator};
use strategybot::indicators::{indicator_snapshot, market_snapshot};
use strategybot::llm::{BlockingAnalyzer, OpenAiAnalyzer};
use strategybot::manager::{AdaptiveStrategyManager, DecisionEngine, StrategyManager};
use strategybot::models::{Candle, Portfolio};
use strategybot::tracker::InMemoryTracker;
use strategybot::volatility::RealizedVolatilityAnalyzer;

const PRODUCT_ID: &str = "SOL-USD";

#[derive(Parser)]
#[command(name = "strategybot", about = "Multi-strategy trading signal engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a synthetic scenario (or a candle file) through one engine
    Backtest {
        /// uptrend | downtrend | sideways | volatile | bear_grind
        #[arg(long, default_value = "uptrend")]
        scenario: String,

        /// weighted | adaptive
        #[arg(long, default_value = "adaptive")]
        engine: String,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long, default_value_t = 720)]
        candles: usize,

        /// JSON file with an array of candles; overrides --scenario
        #[arg(long)]
        file: Option<PathBuf>,

        #[arg(long, default_value_t = 10_000.0)]
        portfolio: f64,
    },

    /// Run both engines across every synthetic scenario
    Compare {
        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long, default_value_t = 720)]
        candles: usize,

        #[arg(long, default_value_t = 10_000.0)]
        portfolio: f64,
    },

    /// Evaluate the latest tick of a candle file and print the signal
    Evaluate {
        /// JSON file with an array of candles
        #[arg(long)]
        file: PathBuf,

        /// weighted | adaptive
        #[arg(long, default_value = "adaptive")]
        engine: String,

        /// Include the LLM strategy (requires OPENAI_API_KEY)
        #[arg(long)]
        llm: bool,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    match cli.command {
        Command::Backtest {
            scenario,
            engine,
            seed,
            candles,
            file,
            portfolio,
        } => run_backtest(&scenario, &engine, seed, candles, file.as_deref(), portfolio),
        Command::Compare {
            seed,
            candles,
            portfolio,
        } => run_compare(seed, candles, portfolio),
        Command::Evaluate { file, engine, llm } => run_evaluate(&file, &engine, llm),
    }
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strategybot=info".into()),
        )
        .init();
}

/// Build an engine plus a handle to its tracker so reports can read the
/// decision history afterwards
fn build_engine(
    kind: &str,
    with_llm: bool,
) -> anyhow::Result<(Box<dyn DecisionEngine>, Arc<InMemoryTracker>)> {
    let tracker = Arc::new(InMemoryTracker::new());

    let llm_analyzer = if with_llm {
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY not set; required for --llm")?;
        let mut analyzer = OpenAiAnalyzer::new(api_key);
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            analyzer = analyzer.with_model(model);
        }
        Some(Arc::new(
            BlockingAnalyzer::new(analyzer).map_err(|e| anyhow::anyhow!("{e}"))?,
        ))
    } else {
        None
    };

    let engine: Box<dyn DecisionEngine> = match kind {
        "weighted" => {
            let manager = match llm_analyzer {
                Some(analyzer) => StrategyManager::with_llm(PRODUCT_ID, analyzer),
                None => StrategyManager::new(PRODUCT_ID),
            };
            Box::new(
                manager
                    .with_tracker(tracker.clone())
                    .with_volatility_analyzer(Arc::new(RealizedVolatilityAnalyzer::default())),
            )
        }
        "adaptive" => {
            let manager = match llm_analyzer {
                Some(analyzer) => AdaptiveStrategyManager::with_llm(PRODUCT_ID, analyzer),
                None => AdaptiveStrategyManager::new(PRODUCT_ID),
            };
            Box::new(manager.with_tracker(tracker.clone()))
        }
        other => bail!("unknown engine '{}', expected 'weighted' or 'adaptive'", other),
    };

    Ok((engine, tracker))
}

fn load_candles(path: &Path) -> anyhow::Result<Vec<Candle>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading candle file {}", path.display()))?;
    let candles: Vec<Candle> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing candle file {}", path.display()))?;
    if candles.is_empty() {
        bail!("candle file {} is empty", path.display());
    }
    Ok(candles)
}

fn run_backtest(
    scenario: &str,
    engine_kind: &str,
    seed: u64,
    num_candles: usize,
    file: Option<&Path>,
    portfolio: f64,
) -> anyhow::Result<()> {
    let (candles, label) = match file {
        Some(path) => (load_candles(path)?, "file".to_string()),
        None => {
            let parsed = MarketScenario::parse(scenario)
                .with_context(|| format!("unknown scenario '{}'", scenario))?;
            (
                SyntheticDataGenerator::new(seed).generate(parsed, num_candles),
                parsed.label().to_string(),
            )
        }
    };

    let (mut engine, tracker) = build_engine(engine_kind, false)?;
    let runner = BacktestRunner::new(portfolio);
    let metrics = runner
        .run(engine.as_mut(), &candles, &label)
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    metrics.print_report();
    println!(
        "\nTracker summary: {}",
        serde_json::to_string_pretty(&tracker.summary())?
    );
    Ok(())
}

fn run_compare(seed: u64, num_candles: usize, portfolio: f64) -> anyhow::Result<()> {
    let runner = BacktestRunner::new(portfolio);
    let mut results: Vec<BacktestMetrics> = Vec::new();

    for scenario in MarketScenario::ALL {
        // Same seed per scenario so both engines see identical tape
        let candles = SyntheticDataGenerator::new(seed).generate(scenario, num_candles);

        for engine_kind in ["weighted", "adaptive"] {
            let (mut engine, _tracker) = build_engine(engine_kind, false)?;
            let metrics = runner
                .run(engine.as_mut(), &candles, scenario.label())
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            results.push(metrics);
        }
    }

    println!("\n{:<12} {:<10} {:>9} {:>6} {:>6} {:>7}", "Scenario", "Engine", "Return%", "Buys", "Sells", "Win%");
    println!("{}", "─".repeat(56));
    for m in &results {
        println!(
            "{:<12} {:<10} {:>8.2} {:>6} {:>6} {:>6.1}",
            m.scenario, m.engine, m.total_return_pct, m.buys, m.sells, m.win_rate_pct
        );
    }
    Ok(())
}

fn run_evaluate(file: &Path, engine_kind: &str, llm: bool) -> anyhow::Result<()> {
    let candles = load_candles(file)?;
    let window_start = candles.len().saturating_sub(200);
    let window = &candles[window_start..];

    let market = market_snapshot(window);
    let indicators = indicator_snapshot(window);

    let (mut engine, _tracker) = build_engine(engine_kind, llm)?;
    let signal = engine.get_combined_signal(&market, &indicators, &Portfolio::default());

    tracing::info!(
        "{} regime={} -> {} @{:.0}",
        engine.engine_name(),
        engine.regime_label(),
        signal.action,
        signal.confidence
    );
    println!("{}", serde_json::to_string_pretty(&signal)?);
    Ok(())
}
