use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use backtest::{BacktestSummary, Backtester};
use common::{CandleSource, Config};
use engine::{load_pairs, normalize_symbol, BinanceClient, Engine, Schedule};
use strategy::{SignalDetector, StrategyFileConfig};
use telegram_notify::{format_signals, TelegramNotifier};

#[derive(Parser)]
#[command(
    name = "bhbot",
    about = "Heikin-Ashi / Bollinger Band reversal signal bot"
)]
struct Cli {
    /// Strategy config (TOML). Overrides STRATEGY_CONFIG_PATH.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan on the configured schedule and post signals to Telegram.
    Run,
    /// Scan once, print the message and post it if bots are configured.
    Scan,
    /// Replay recent history per pair and print the results.
    Backtest {
        /// Days of history to fetch.
        #[arg(long, default_value_t = 30)]
        days: u32,

        /// Pairs to test instead of the pairs file.
        #[arg(long, num_args = 1..)]
        pairs: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("failed to load environment config")?;
    let strategy_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from(&cfg.strategy_config_path));
    let strategy_file = StrategyFileConfig::load(&strategy_path)
        .with_context(|| format!("failed to load {}", strategy_path.display()))?;

    let client = BinanceClient::new(&cfg.binance_base_url)?
        .closed_only(strategy_file.market.closed_only);
    let source: Arc<dyn CandleSource> = Arc::new(client);

    match cli.command {
        Commands::Run => run(&cfg, &strategy_file, source).await,
        Commands::Scan => scan_once(&cfg, &strategy_file, source).await,
        Commands::Backtest { days, pairs } => {
            backtest(&cfg, &strategy_file, source.as_ref(), days, pairs).await
        }
    }
}

fn build_engine(
    cfg: &Config,
    strategy_file: &StrategyFileConfig,
    source: Arc<dyn CandleSource>,
) -> Result<Engine> {
    let pairs = load_pairs(&cfg.pairs_file)?;
    let schedule = Schedule::from_config(&strategy_file.schedule)?;
    Ok(Engine::new(
        source,
        SignalDetector::new(strategy_file.strategy.clone()),
        pairs,
        strategy_file.market.clone(),
        schedule,
    ))
}

async fn run(cfg: &Config, strategy_file: &StrategyFileConfig, source: Arc<dyn CandleSource>) -> Result<()> {
    let engine = build_engine(cfg, strategy_file, source)?;
    let notifier = TelegramNotifier::new(&cfg.telegram_targets, strategy_file.market.timeframe);
    if notifier.is_empty() {
        warn!("No Telegram targets configured, signals will only be logged");
    }

    let (report_tx, report_rx) = mpsc::channel(8);
    let engine_task = tokio::spawn(engine.run(report_tx));
    let notifier_task = tokio::spawn(notifier.run(report_rx));

    info!("bhbot running. Press Ctrl-C to stop.");
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for Ctrl-C")?;
            info!("Shutdown signal received");
        }
        _ = engine_task => warn!("Engine task ended"),
        _ = notifier_task => warn!("Notifier task ended"),
    }
    Ok(())
}

async fn scan_once(
    cfg: &Config,
    strategy_file: &StrategyFileConfig,
    source: Arc<dyn CandleSource>,
) -> Result<()> {
    let engine = build_engine(cfg, strategy_file, source)?;
    let report = engine.run_once().await;

    println!("{}", format_signals(&report, strategy_file.market.timeframe));
    for (pair, reason) in &report.failed {
        println!("failed: {pair}: {reason}");
    }

    let notifier = TelegramNotifier::new(&cfg.telegram_targets, strategy_file.market.timeframe);
    if !notifier.is_empty() {
        notifier.send_report(&report).await;
    }
    Ok(())
}

async fn backtest(
    cfg: &Config,
    strategy_file: &StrategyFileConfig,
    source: &dyn CandleSource,
    days: u32,
    pairs: Vec<String>,
) -> Result<()> {
    let pairs = if pairs.is_empty() {
        load_pairs(&cfg.pairs_file)?
    } else {
        pairs.iter().map(|p| normalize_symbol(p)).collect()
    };
    let timeframe = strategy_file.market.timeframe;
    let total = timeframe.candles_per_days(days);
    info!(pairs = pairs.len(), days, %timeframe, candles = total, "Starting backtest");

    let backtester = Backtester::from_config(strategy_file);
    let mut outcomes = Vec::with_capacity(pairs.len());

    for pair in &pairs {
        let series = match source.fetch_history(pair, timeframe, total).await {
            Ok(s) => s,
            Err(e) => {
                error!(pair = %pair, error = %e, "Failed to fetch history");
                continue;
            }
        };
        match backtester.run(&series) {
            Ok(outcome) => {
                println!("{outcome}");
                outcomes.push(outcome);
            }
            Err(e) => error!(pair = %pair, error = %e, "Backtest failed"),
        }
    }

    println!("{}", BacktestSummary::from_outcomes(&outcomes));
    Ok(())
}
