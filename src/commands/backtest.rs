//! Backtest command implementation

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use swing_signals::regime::RegimeSeries;
use swing_signals::{data, report, Config, GridAggregator, MonthlyBreakdown};
use tracing::{info, warn};

use super::parse_float_list;

pub struct BacktestArgs {
    pub config_path: String,
    pub input: Option<String>,
    pub thresholds: Option<String>,
    pub stops: Option<String>,
    pub years: Option<u32>,
    pub json: bool,
    pub monthly: bool,
    pub sequential: bool,
}

pub fn run(args: BacktestArgs) -> Result<()> {
    info!("Starting robustness backtest");

    let mut config = Config::load_or_default(&args.config_path)?;
    info!("Loaded configuration from: {}", args.config_path);

    // Apply overrides
    if let Some(input) = args.input {
        config.data.scored_path = input;
    }
    if let Some(thresholds) = &args.thresholds {
        config.backtest.thresholds = parse_float_list(thresholds)?;
    }
    if let Some(stops) = &args.stops {
        config.backtest.stop_levels = parse_float_list(stops)?;
    }
    if let Some(years) = args.years {
        config.backtest.out_of_sample_years = (years > 0).then_some(years);
    }
    config.validate()?;

    let mut bars = data::load_bars(&config.data.scored_path)?;
    if bars.is_empty() {
        anyhow::bail!("No usable rows in {}", config.data.scored_path);
    }

    if bars.iter().all(|b| b.regime.is_none()) {
        let path = Path::new(&config.data.candles_dir)
            .join(format!("{}.csv", config.dataset.benchmark));
        match data::load_candles(&path) {
            Ok(candles) => {
                RegimeSeries::from_benchmark(&candles, config.dataset.regime_sma).attach(&mut bars);
                info!("Regime column missing; derived from {}", path.display());
            }
            Err(e) => warn!("Regime column missing and no benchmark data: {:#}", e),
        }
    }

    if let Some(years) = config.backtest.out_of_sample_years {
        let total = bars.len();
        bars = data::filter_out_of_sample(bars, years);
        info!("Out-of-sample window: {} of {} bars (last {} years)", bars.len(), total, years);
    }

    let aggregator = GridAggregator::new(config.backtest.simulation(), config.backtest.grid())
        .context("Invalid backtest configuration")?;
    let total_cells = aggregator.grid().total_combinations();

    println!("\n{}", "=".repeat(70));
    println!("ROBUSTNESS TEST");
    println!("{}", "=".repeat(70));
    println!("  Scored table: {}", config.data.scored_path);
    println!("  Bars:         {}", bars.len());
    println!("  Thresholds:   {:?}", aggregator.grid().thresholds);
    println!("  Stops:        {:?}", aggregator.grid().stop_levels);
    println!("  Max hold:     {} bars", config.backtest.max_hold_bars);
    println!(
        "  Mode:         {}",
        if args.sequential { "sequential" } else { "parallel" }
    );
    println!("{}\n", "=".repeat(70));

    let pb = ProgressBar::new(total_cells as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "⚡ {percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}, {per_sec}] ✓ {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█░ "),
    );
    pb.set_message("starting...");

    let grid_report = aggregator.run_with_progress(&bars, args.sequential, pb)?;

    print!("{}", report::render(&grid_report));

    let csv_path = report::write_csv(&grid_report.results, &config.data.results_dir)?;
    println!("Results saved to: {}", csv_path.display());
    if args.json {
        let json_path = report::write_json(&grid_report, &config.data.results_dir)?;
        println!("JSON saved to: {}", json_path.display());
    }

    if args.monthly {
        if let Some(best) = grid_report.best() {
            let cell = aggregator.run_cell(&bars, best.threshold, best.stop_pct);
            print!("{}", MonthlyBreakdown::from_trades(&cell.trades).render());
        }
    }

    info!("Backtest completed successfully");
    Ok(())
}
