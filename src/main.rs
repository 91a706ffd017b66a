//! crossfarm command line
//!
//! Trains moving-average crossover strategies on an in-process worker pool and
//! serves buy/hold decisions from the stored models.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossfarm::application::system::Application;
use crossfarm::config::Config;
use crossfarm::domain::optimization::Decision;
use crossfarm::infrastructure::observability::MetricsReporter;
use std::path::PathBuf;
use tracing::{Level, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about = "Distributed moving-average crossover trainer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the best (short, long) window pair for a symbol and store it
    Train {
        /// Symbol to train, matching `{SYMBOL}.csv` in the price directory
        #[arg(short, long, default_value = "BTC")]
        symbol: String,

        /// Number of fitness workers (overrides WORKER_COUNT)
        #[arg(short, long)]
        workers: Option<usize>,

        /// TOML file with optimizer settings
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Ask the stored strategy whether to buy now
    Decide {
        #[arg(short, long, default_value = "BTC")]
        symbol: String,
    },
    /// List symbols with a stored model
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("Failed to load config")?;

    match cli.command {
        Commands::Train {
            symbol,
            workers,
            config: optimizer_file,
        } => {
            if let Some(path) = optimizer_file {
                info!("Loading optimizer config from: {:?}", path);
                config = config.with_optimizer_file(&path)?;
            }
            if let Some(workers) = workers {
                config.dispatch.worker_count = workers.max(1);
            }
            train(config, &symbol).await
        }
        Commands::Decide { symbol } => decide(config, &symbol).await,
        Commands::Models => list_models(config).await,
    }
}

async fn train(config: Config, symbol: &str) -> Result<()> {
    let observability = config.observability.clone();
    let app = Application::build(config).await?;

    let reporter = observability.enabled.then(|| {
        let reporter =
            MetricsReporter::new(app.metrics.clone(), observability.report_interval_seconds);
        tokio::spawn(reporter.run())
    });

    info!("crossfarm {} training {}", env!("CARGO_PKG_VERSION"), symbol);
    let system = app.start(symbol).await?;
    let result = system.agent.train().await;
    system.shutdown().await;

    if let Some(reporter) = reporter {
        reporter.abort();
        MetricsReporter::new(app.metrics.clone(), 1).report();
    }

    let report = result?;
    println!("\n{}", "=".repeat(60));
    println!("{:>10} | {:>12} | {:>14} | {:>14}", "Generation", "Windows", "Best fitness", "Mean fitness");
    println!("{}", "-".repeat(60));
    for generation in &report.outcome.history {
        println!(
            "{:>10} | {:>12} | {:>14.4} | {:>14.4}",
            generation.generation + 1,
            generation.best.to_string(),
            generation.best_fitness,
            generation.mean_fitness
        );
    }
    println!("{}", "=".repeat(60));
    println!(
        "{}: short={} long={} fitness={:.4}",
        report.model.symbol, report.model.short_window, report.model.long_window, report.model.fitness
    );
    Ok(())
}

async fn decide(config: Config, symbol: &str) -> Result<()> {
    let app = Application::build(config).await?;
    let agent = app.decision_agent(symbol);

    let decision = agent.decide().await?;
    match decision {
        Decision::Buy => println!("{}: BUY ({})", symbol, decision.answer()),
        Decision::Hold => println!("{}: HOLD ({})", symbol, decision.answer()),
    }
    Ok(())
}

async fn list_models(config: Config) -> Result<()> {
    let app = Application::build(config).await?;
    let symbols = app.repository.symbols().await?;
    if symbols.is_empty() {
        warn!("No trained models found");
        return Ok(());
    }

    for symbol in symbols {
        if let Some(model) = app.repository.load(&symbol).await? {
            println!(
                "{:<8} short={:<4} long={:<4} fitness={:<12.4} trained_at={}",
                model.symbol,
                model.short_window,
                model.long_window,
                model.fitness,
                model.trained_at.to_rfc3339()
            );
        }
    }
    Ok(())
}
