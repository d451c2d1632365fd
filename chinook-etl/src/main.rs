//! chinook-etl - Sales reporting pipeline
//!
//! Extracts invoice lines from a Chinook SQLite database, aggregates them by
//! month, quarter, year, genre and artist, and writes one CSV per report.
//!
//! Configuration priority: CLI flags > config file (CLI > ENV > platform dir)
//! > compiled defaults.

use anyhow::{Context, Result};
use chinook_common::config::{ConfigResolver, LoggingConfig, PipelineConfig, StrategyKind};
use chinook_common::logging::build_log_sink;
use chinook_etl::Orchestrator;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

/// Command-line arguments for chinook-etl
#[derive(Parser, Debug)]
#[command(name = "chinook-etl")]
#[command(about = "Extract Chinook sales, aggregate them, and write CSV reports")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database to read
    #[arg(long, env = "CHINOOK_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Directory for reports without an explicit path
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Number of artists in the top artists report
    #[arg(long, allow_negative_numbers = true)]
    top_n: Option<i64>,

    /// Year for the annual report (default: latest invoice year)
    #[arg(long)]
    year: Option<i32>,

    /// Use one aggregation strategy for every report: query | client
    #[arg(long, value_parser = parse_strategy)]
    strategy: Option<StrategyKind>,

    /// Log file (in addition to stdout)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn parse_strategy(raw: &str) -> std::result::Result<StrategyKind, String> {
    raw.parse().map_err(|e: chinook_common::Error| e.to_string())
}

fn apply_overrides(config: &mut PipelineConfig, args: &Args) {
    if let Some(path) = &args.db_path {
        config.db.path = path.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.reports.output_dir = dir.clone();
    }
    if let Some(top_n) = args.top_n {
        config.top_n = top_n;
    }
    if let Some(year) = args.year {
        config.year = Some(year);
    }
    if let Some(strategy) = args.strategy {
        config.set_strategy_for_all(strategy);
    }
    if let Some(log_file) = &args.log_file {
        config.logging.path = Some(log_file.clone());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Stdout-only sink until the configured one can be built
    let bootstrap = build_log_sink(&LoggingConfig {
        path: None,
        level: "info".to_string(),
    })?;
    let mut config = tracing::dispatcher::with_default(&bootstrap, || {
        ConfigResolver::new("chinook-etl").resolve(args.config.as_deref())
    })?;
    apply_overrides(&mut config, &args);

    let log_sink = build_log_sink(&config.logging)?;
    tracing::dispatcher::set_global_default(log_sink.clone())
        .context("Failed to install log sink")?;

    info!(
        "Starting chinook-etl v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Database path: {}", config.db.path.display());

    let mut orchestrator = Orchestrator::new(config, log_sink);
    match orchestrator.run().await {
        Ok(run) => {
            info!(
                "✓ Run {} completed: {} steps in {:.3}s",
                run.run_id,
                run.steps.len(),
                run.elapsed.as_secs_f64()
            );
            Ok(())
        }
        Err(e) => {
            error!("Data pipeline failed: {}", e);
            Err(e.into())
        }
    }
}
