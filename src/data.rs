//! Data loading and management
//!
//! Reads the scored research table consumed by the backtest and scanner, and
//! the per-ticker OHLCV files the dataset builder works from. Rows that
//! cannot be used are skipped with a warning rather than failing the load.

use anyhow::{Context, Result};
use chrono::{Months, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use crate::{Candle, MarketBar, Regime, Ticker};

// =============================================================================
// Date Parsing
// =============================================================================

/// Parse a date string (YYYY-MM-DD, YYYY-MM-DD HH:MM:SS or RFC 3339) to a calendar day
pub fn parse_date(date_str: &str) -> Result<NaiveDate> {
    let s = date_str.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date()))
        .or_else(|_| chrono::DateTime::parse_from_rfc3339(s).map(|dt| dt.date_naive()))
        .with_context(|| format!("Failed to parse date: {}", date_str))
}

// =============================================================================
// Scored Table
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawBar {
    #[serde(alias = "Date")]
    date: String,
    #[serde(alias = "Ticker")]
    ticker: String,
    #[serde(alias = "Close")]
    close: f64,
    #[serde(alias = "High")]
    high: f64,
    #[serde(alias = "Low")]
    low: f64,
    long_prob: f64,
    short_prob: f64,
    #[serde(default)]
    regime: Option<String>,
}

impl RawBar {
    fn into_bar(self) -> Result<MarketBar> {
        let prices = [self.close, self.high, self.low];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            anyhow::bail!(
                "non-positive price: close={}, high={}, low={}",
                self.close,
                self.high,
                self.low
            );
        }
        if !self.long_prob.is_finite() || !self.short_prob.is_finite() {
            anyhow::bail!("probabilities must be finite");
        }

        Ok(MarketBar {
            date: parse_date(&self.date)?,
            ticker: Ticker::new(self.ticker.trim()),
            close: self.close,
            high: self.high,
            low: self.low,
            long_prob: self.long_prob,
            short_prob: self.short_prob,
            regime: self.regime.as_deref().and_then(|r| r.parse::<Regime>().ok()),
        })
    }
}

/// Load the scored table (date, ticker, close, high, low, long_prob, short_prob, regime).
///
/// Row order is preserved exactly; the table must already be sorted by
/// (ticker, date). Extra columns are ignored and an empty or unknown regime
/// loads as absent.
pub fn load_bars(path: impl AsRef<Path>) -> Result<Vec<MarketBar>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open scored table: {}", path.display()))?;

    let mut bars = Vec::new();
    let mut invalid_count = 0;

    for (row_idx, result) in reader.deserialize::<RawBar>().enumerate() {
        let parsed = result
            .map_err(anyhow::Error::from)
            .and_then(RawBar::into_bar);

        match parsed {
            Ok(bar) => bars.push(bar),
            Err(e) => {
                invalid_count += 1;
                warn!(
                    "Skipping invalid row {} in {:?}: {}",
                    row_idx + 2, // +2 for 1-indexed and header row
                    path.file_name().unwrap_or_default(),
                    e
                );
            }
        }
    }

    if invalid_count > 0 {
        warn!(
            "Skipped {} invalid rows out of {} in {:?}",
            invalid_count,
            invalid_count + bars.len(),
            path.file_name().unwrap_or_default()
        );
    }

    info!("Loaded {} scored bars from {}", bars.len(), path.display());
    Ok(bars)
}

/// Keep bars dated within `years` of the most recent date in the table
pub fn filter_out_of_sample(bars: Vec<MarketBar>, years: u32) -> Vec<MarketBar> {
    let Some(max_date) = bars.iter().map(|b| b.date).max() else {
        return bars;
    };
    let cutoff = max_date
        .checked_sub_months(Months::new(years.saturating_mul(12)))
        .unwrap_or(NaiveDate::MIN);

    bars.into_iter().filter(|b| b.date >= cutoff).collect()
}

/// Last bar of every ticker, by date
pub fn latest_by_ticker(bars: &[MarketBar]) -> Vec<&MarketBar> {
    let mut latest: BTreeMap<&Ticker, &MarketBar> = BTreeMap::new();
    for bar in bars {
        latest
            .entry(&bar.ticker)
            .and_modify(|current| {
                if bar.date >= current.date {
                    *current = bar;
                }
            })
            .or_insert(bar);
    }
    latest.into_values().collect()
}

/// Bars of one ticker, in table order
pub fn history_for<'a>(bars: &'a [MarketBar], ticker: &Ticker) -> Vec<&'a MarketBar> {
    bars.iter().filter(|b| &b.ticker == ticker).collect()
}

// =============================================================================
// OHLCV Candles
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawCandle {
    #[serde(alias = "Date", alias = "datetime")]
    date: String,
    #[serde(alias = "Open")]
    open: f64,
    #[serde(alias = "High")]
    high: f64,
    #[serde(alias = "Low")]
    low: f64,
    #[serde(alias = "Close")]
    close: f64,
    #[serde(alias = "Volume", default)]
    volume: f64,
}

/// Load daily OHLCV data from a CSV file with validation
pub fn load_candles(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).context("Failed to open CSV file")?;

    let mut candles = Vec::new();
    let mut invalid_count = 0;

    for (row_idx, result) in reader.deserialize::<RawCandle>().enumerate() {
        let raw = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;
        let date = parse_date(&raw.date)?;

        match Candle::new(date, raw.open, raw.high, raw.low, raw.close, raw.volume) {
            Ok(candle) => candles.push(candle),
            Err(e) => {
                invalid_count += 1;
                warn!(
                    "Skipping invalid candle at row {} in {:?}: {}",
                    row_idx + 2,
                    path.file_name().unwrap_or_default(),
                    e
                );
            }
        }
    }

    if invalid_count > 0 {
        warn!(
            "Skipped {} invalid candles out of {} in {:?}",
            invalid_count,
            invalid_count + candles.len(),
            path.file_name().unwrap_or_default()
        );
    }

    candles.sort_by_key(|c| c.date);
    candles.dedup_by_key(|c| c.date);

    Ok(candles)
}

/// Load `<data_dir>/<TICKER>.csv` for every ticker; unreadable tickers are skipped
pub fn load_universe(
    data_dir: impl AsRef<Path>,
    tickers: &[Ticker],
) -> BTreeMap<Ticker, Vec<Candle>> {
    let data_dir = data_dir.as_ref();
    let mut universe = BTreeMap::new();

    for ticker in tickers {
        let path = data_dir.join(format!("{}.csv", ticker));
        match load_candles(&path) {
            Ok(candles) if !candles.is_empty() => {
                universe.insert(ticker.clone(), candles);
            }
            Ok(_) => warn!("{} has no usable candles in {}", ticker, path.display()),
            Err(e) => warn!("{} failed: {:#}", ticker, e),
        }
    }

    info!(
        "Loaded candles for {}/{} tickers from {}",
        universe.len(),
        tickers.len(),
        data_dir.display()
    );
    universe
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 3).unwrap();
        assert_eq!(parse_date("2024-05-03").unwrap(), expected);
        assert_eq!(parse_date("2024-05-03 00:00:00").unwrap(), expected);
        assert!(parse_date("05/03/2024").is_err());
    }

    #[test]
    fn test_load_bars_keeps_order_and_maps_regime() {
        let file = write_temp(
            "Date,Ticker,Close,High,Low,long_prob,short_prob,regime,rsi\n\
             2024-01-02,MSFT,370.0,372.0,365.0,0.8,0.1,BULL,55.0\n\
             2024-01-01,AAPL,190.0,191.0,188.0,0.2,0.7,,48.0\n\
             2024-01-03,AAPL,-1.0,191.0,188.0,0.2,0.7,BEAR,48.0\n\
             2024-01-04,AAPL,189.0,191.0,188.0,0.2,0.7,SIDEWAYS,48.0\n",
        );

        let bars = load_bars(file.path()).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].ticker, Ticker::new("MSFT"));
        assert_eq!(bars[0].regime, Some(Regime::Bull));
        assert_eq!(bars[1].regime, None);
        assert_eq!(bars[2].regime, None);
    }

    #[test]
    fn test_filter_out_of_sample() {
        let make = |y, m, d| MarketBar {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            ticker: Ticker::new("AAPL"),
            close: 1.0,
            high: 1.0,
            low: 1.0,
            long_prob: 0.0,
            short_prob: 0.0,
            regime: None,
        };
        let bars = vec![make(2020, 1, 1), make(2022, 6, 1), make(2024, 6, 1)];
        let kept = filter_out_of_sample(bars, 2);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].date, NaiveDate::from_ymd_opt(2022, 6, 1).unwrap());

        // Huge windows keep everything instead of overflowing
        let bars = vec![make(2020, 1, 1), make(2024, 6, 1)];
        assert_eq!(filter_out_of_sample(bars, u32::MAX).len(), 2);
    }

    #[test]
    fn test_load_candles_skips_invalid() {
        let file = write_temp(
            "Date,Open,High,Low,Close,Volume\n\
             2024-01-03,10,11,9,10.5,100\n\
             2024-01-02,10,9,11,10.5,100\n\
             2024-01-01,10,11,9,10.2,100\n",
        );
        let candles = load_candles(file.path()).unwrap();
        assert_eq!(candles.len(), 2);
        assert!(candles[0].date < candles[1].date);
    }
}
