//! Swing signals - main entry point
//!
//! This binary provides five subcommands:
//! - backtest: Threshold/stop robustness grid over a scored table
//! - dataset: Build the labeled feature dataset from daily candles
//! - scan: Today's best setup as an execution plan
//! - recap: End-of-day movers
//! - bot: Chat bot with on-demand and scheduled alerts

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "swing-signals")]
#[command(about = "Swing-trading research: dataset, robustness backtest, daily scanner and alert bot", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "configs/swing.json")]
    config: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the threshold × stop robustness grid
    Backtest {
        /// Scored table (overrides config)
        #[arg(short, long)]
        input: Option<String>,

        /// Probability thresholds, comma-separated. E.g. "0.65,0.70,0.75"
        #[arg(long)]
        thresholds: Option<String>,

        /// Stop levels, comma-separated. E.g. "0.02,0.03"
        #[arg(long)]
        stops: Option<String>,

        /// Only replay the most recent N years (0 replays everything)
        #[arg(long)]
        years: Option<u32>,

        /// Also write the report as JSON
        #[arg(long)]
        json: bool,

        /// Print a monthly breakdown of the best cell
        #[arg(long)]
        monthly: bool,

        /// Run sequentially instead of parallel
        #[arg(long)]
        sequential: bool,
    },

    /// Build the labeled feature dataset
    Dataset {
        /// Output CSV (overrides config)
        #[arg(short, long)]
        output: Option<String>,

        /// Tickers (comma-separated, overrides config)
        #[arg(short, long)]
        tickers: Option<String>,
    },

    /// Find today's best setup
    Scan {
        /// Scored table (overrides config)
        #[arg(short, long)]
        input: Option<String>,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// End-of-day movers
    Recap {
        /// Number of gainers and losers
        #[arg(short, long)]
        top: Option<usize>,
    },

    /// Run the chat bot until Ctrl+C
    Bot,
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Set log level - filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    if file_only {
        // Keep the console clean for the progress bar
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("Logging initialized");
        info!("Log file: {}", log_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Backtest { .. } => ("backtest", true), // File-only for clean progress bar
        Commands::Dataset { .. } => ("dataset", false),
        Commands::Scan { .. } => ("scan", false),
        Commands::Recap { .. } => ("recap", false),
        Commands::Bot => ("bot", false),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Backtest {
            input,
            thresholds,
            stops,
            years,
            json,
            monthly,
            sequential,
        } => commands::backtest::run(commands::backtest::BacktestArgs {
            config_path: cli.config,
            input,
            thresholds,
            stops,
            years,
            json,
            monthly,
            sequential,
        }),

        Commands::Dataset { output, tickers } => commands::dataset::run(cli.config, output, tickers),

        Commands::Scan { input, json } => commands::scan::run(cli.config, input, json),

        Commands::Recap { top } => commands::recap::run(cli.config, top),

        Commands::Bot => commands::bot::run(cli.config),
    }
}
