//! Labeled feature dataset
//!
//! Turns per-ticker daily candles into the feature/label table the external
//! model is trained on. Labels look `future_days` bars ahead at the highest
//! high and lowest low; a row is positive when that excursion reaches
//! `target_move` of the close.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use crate::config::DatasetConfig;
use crate::indicators;
use crate::regime::RegimeSeries;
use crate::{Candle, Regime, Ticker};

/// Feature names in the order the model expects them
pub const FEATURES: &[&str] = &[
    "return_5",
    "return_10",
    "dist_sma20",
    "rsi",
    "volume_spike",
    "above_sma20",
    "above_sma50",
    "above_sma200",
    "breakout_20d",
];

/// One labeled row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub ticker: Ticker,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub return_5: f64,
    pub return_10: f64,
    pub dist_sma20: f64,
    pub rsi: f64,
    pub volume_spike: f64,
    pub above_sma20: u8,
    pub above_sma50: u8,
    pub above_sma200: u8,
    pub breakout_20d: u8,
    pub long_target: u8,
    pub short_target: u8,
    pub regime: Option<Regime>,
}

/// Look-ahead extremes: max high / min low over bars `i+1 ..= i+horizon`
fn future_extremes(candles: &[Candle], i: usize, horizon: usize) -> Option<(f64, f64)> {
    let window = candles.get(i + 1..=i + horizon)?;
    let max_high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let min_low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    Some((max_high, min_low))
}

/// Build features and labels for one ticker; rows missing any value are dropped
pub fn build_rows(
    ticker: &Ticker,
    candles: &[Candle],
    regimes: Option<&RegimeSeries>,
    config: &DatasetConfig,
) -> Vec<FeatureRow> {
    let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let volume: Vec<f64> = candles.iter().map(|c| c.volume).collect();

    let return_5 = indicators::pct_change(&close, 5);
    let return_10 = indicators::pct_change(&close, 10);
    let sma20 = indicators::sma(&close, 20);
    let sma50 = indicators::sma(&close, 50);
    let sma200 = indicators::sma(&close, 200);
    let rsi = indicators::rsi(&close, 14);
    let volume_sma20 = indicators::sma(&volume, 20);
    let high_20 = indicators::rolling_max(&high, 20);

    let flag = |b: bool| u8::from(b);

    (0..candles.len())
        .filter_map(|i| {
            let c = &candles[i];
            let sma20 = sma20[i]?;
            let vol_avg = volume_sma20[i].filter(|v| *v > 0.0)?;
            // Breakout against the 20-day high that ends on the previous bar
            let prior_high = high_20.get(i.checked_sub(1)?).copied().flatten()?;
            let (future_max, future_min) = future_extremes(candles, i, config.future_days)?;

            Some(FeatureRow {
                date: c.date,
                ticker: ticker.clone(),
                open: c.open,
                high: c.high,
                low: c.low,
                close: c.close,
                volume: c.volume,
                return_5: return_5[i]?,
                return_10: return_10[i]?,
                dist_sma20: (c.close - sma20) / sma20,
                rsi: rsi[i]?,
                volume_spike: c.volume / vol_avg,
                above_sma20: flag(c.close > sma20),
                above_sma50: flag(c.close > sma50[i]?),
                above_sma200: flag(c.close > sma200[i]?),
                breakout_20d: flag(c.close > prior_high),
                long_target: flag((future_max - c.close) / c.close >= config.target_move),
                short_target: flag((c.close - future_min) / c.close >= config.target_move),
                regime: regimes.and_then(|r| r.get(c.date)),
            })
        })
        .collect()
}

/// Summary of a dataset build
#[derive(Debug, Clone, Default)]
pub struct DatasetSummary {
    pub rows: usize,
    pub tickers_used: usize,
    pub tickers_skipped: Vec<Ticker>,
    pub long_positive_rate: f64,
    pub short_positive_rate: f64,
}

/// Build rows for every ticker in the universe, sorted by (ticker, date)
pub fn build_dataset(
    universe: &BTreeMap<Ticker, Vec<Candle>>,
    benchmark: Option<&[Candle]>,
    config: &DatasetConfig,
) -> (Vec<FeatureRow>, DatasetSummary) {
    let regimes = benchmark.map(|b| RegimeSeries::from_benchmark(b, config.regime_sma));
    if regimes.is_none() {
        warn!("No benchmark candles; regime column will be empty");
    }

    let pb = ProgressBar::new(universe.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█░ "),
    );

    let mut rows = Vec::new();
    let mut summary = DatasetSummary::default();

    for (ticker, candles) in universe {
        pb.set_message(ticker.to_string());

        if candles.len() < config.min_history {
            warn!(
                "{} skipped: {} candles < {} required",
                ticker,
                candles.len(),
                config.min_history
            );
            summary.tickers_skipped.push(ticker.clone());
            pb.inc(1);
            continue;
        }

        let ticker_rows = build_rows(ticker, candles, regimes.as_ref(), config);
        if ticker_rows.is_empty() {
            summary.tickers_skipped.push(ticker.clone());
        } else {
            summary.tickers_used += 1;
            rows.extend(ticker_rows);
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    summary.rows = rows.len();
    if !rows.is_empty() {
        let n = rows.len() as f64;
        summary.long_positive_rate = rows.iter().filter(|r| r.long_target == 1).count() as f64 / n;
        summary.short_positive_rate = rows.iter().filter(|r| r.short_target == 1).count() as f64 / n;
    }

    info!(
        "Dataset built: {} rows from {} tickers ({} skipped)",
        summary.rows,
        summary.tickers_used,
        summary.tickers_skipped.len()
    );

    (rows, summary)
}

/// Write rows as CSV
pub fn write_dataset(rows: &[FeatureRow], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}
