//! Dataset command implementation

use anyhow::Result;
use std::path::Path;
use swing_signals::{data, dataset, Config, Ticker};
use tracing::{info, warn};

pub fn run(config_path: String, output: Option<String>, tickers: Option<String>) -> Result<()> {
    info!("Building feature dataset");

    let mut config = Config::load_or_default(&config_path)?;
    if let Some(output) = output {
        config.data.dataset_path = output;
    }
    if let Some(tickers) = tickers {
        config.data.tickers = tickers
            .split(',')
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect();
    }
    config.validate()?;

    let tickers = config.data.tickers();
    let universe = data::load_universe(&config.data.candles_dir, &tickers);
    if universe.is_empty() {
        anyhow::bail!("No candle files found in {}", config.data.candles_dir);
    }

    let benchmark_path = Path::new(&config.data.candles_dir)
        .join(format!("{}.csv", Ticker::new(config.dataset.benchmark.to_uppercase())));
    let benchmark = match data::load_candles(&benchmark_path) {
        Ok(candles) => Some(candles),
        Err(e) => {
            warn!("Benchmark unavailable: {:#}", e);
            None
        }
    };

    let (rows, summary) = dataset::build_dataset(&universe, benchmark.as_deref(), &config.dataset);
    if rows.is_empty() {
        anyhow::bail!("Dataset is empty; every ticker was skipped");
    }
    dataset::write_dataset(&rows, &config.data.dataset_path)?;

    println!("\n{}", "=".repeat(60));
    println!("DATASET");
    println!("{}", "=".repeat(60));
    println!("Rows:               {}", summary.rows);
    println!("Tickers used:       {}", summary.tickers_used);
    if !summary.tickers_skipped.is_empty() {
        let skipped: Vec<&str> = summary.tickers_skipped.iter().map(Ticker::as_str).collect();
        println!("Tickers skipped:    {}", skipped.join(", "));
    }
    println!("Features:           {}", dataset::FEATURES.join(", "));
    println!("Long positive rate:  {:.1}%", summary.long_positive_rate * 100.0);
    println!("Short positive rate: {:.1}%", summary.short_positive_rate * 100.0);
    println!("Saved to:           {}", config.data.dataset_path);
    println!("{}", "=".repeat(60));

    Ok(())
}
