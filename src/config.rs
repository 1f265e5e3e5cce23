//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable support for the bot credentials.

use anyhow::{ensure, Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::backtest::{ParamGrid, SimulationParams};
use crate::Ticker;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub bot: BotConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        config.apply_env();
        Ok(config)
    }

    /// Load from file when it exists, otherwise defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            tracing::warn!(
                "Config file {} not found, using defaults",
                path.as_ref().display()
            );
            let mut config = Config::default();
            config.apply_env();
            Ok(config)
        }
    }

    /// Pick up bot credentials from the environment (and `.env`)
    fn apply_env(&mut self) {
        dotenv::dotenv().ok();

        if let Ok(token) = std::env::var("BOT_TOKEN") {
            self.bot.token = Some(token);
        }
        if let Ok(chat_id) = std::env::var("CHAT_ID") {
            match chat_id.trim().parse() {
                Ok(id) => self.bot.chat_id = Some(id),
                Err(_) => tracing::warn!("Ignoring non-numeric CHAT_ID: {}", chat_id),
            }
        }
    }

    /// Range checks across all sections
    pub fn validate(&self) -> Result<()> {
        self.backtest.simulation().validate()?;
        self.backtest.grid().validate()?;

        let s = &self.scanner;
        ensure!(
            (0.0..=1.0).contains(&s.threshold_shares) && (0.0..=1.0).contains(&s.threshold_options),
            "scanner thresholds must be in [0, 1]"
        );
        ensure!(s.account_size > 0.0, "scanner account_size must be > 0");
        ensure!(
            s.risk_shares > 0.0 && s.risk_shares < 1.0,
            "scanner risk_shares must be in (0, 1)"
        );
        ensure!(s.atr_period > 0, "scanner atr_period must be > 0");
        ensure!(s.atr_multiplier > 0.0, "scanner atr_multiplier must be > 0");

        let d = &self.dataset;
        ensure!(d.future_days > 0, "dataset future_days must be > 0");
        ensure!(d.target_move > 0.0, "dataset target_move must be > 0");

        ensure!(self.bot.poll_interval_secs > 0, "bot poll_interval_secs must be > 0");
        self.bot.alert_time()?;

        Ok(())
    }
}

/// File locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory of per-ticker OHLCV files (`<TICKER>.csv`)
    pub candles_dir: String,
    /// Feature/label table written by the dataset builder
    pub dataset_path: String,
    /// Feature table with model probabilities, consumed by backtest and scanner
    pub scored_path: String,
    pub results_dir: String,
    pub tickers: Vec<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            candles_dir: "data".to_string(),
            dataset_path: "dataset.csv".to_string(),
            scored_path: "scored.csv".to_string(),
            results_dir: "results".to_string(),
            tickers: [
                "AAPL", "MSFT", "NVDA", "AMZN", "META", "GOOGL", "TSLA", "JPM", "V", "UNH", "HD",
                "PG", "MA", "BAC", "XOM", "DIS", "NFLX", "AMD", "INTC", "CRM", "PFE", "KO", "PEP",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl DataConfig {
    pub fn tickers(&self) -> Vec<Ticker> {
        self.tickers.iter().map(|s| Ticker::new(s.trim().to_uppercase())).collect()
    }
}

/// Robustness backtest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub thresholds: Vec<f64>,
    pub stop_levels: Vec<f64>,
    pub max_hold_bars: usize,
    pub trade_cost: f64,
    pub risk_per_trade: f64,
    pub initial_capital: f64,
    /// Only replay the most recent N years of the table
    #[serde(default)]
    pub out_of_sample_years: Option<u32>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        let params = SimulationParams::default();
        let grid = ParamGrid::default();
        BacktestConfig {
            thresholds: grid.thresholds,
            stop_levels: grid.stop_levels,
            max_hold_bars: params.max_hold_bars,
            trade_cost: params.trade_cost,
            risk_per_trade: params.risk_per_trade,
            initial_capital: params.initial_capital,
            out_of_sample_years: Some(2),
        }
    }
}

impl BacktestConfig {
    pub fn simulation(&self) -> SimulationParams {
        SimulationParams {
            max_hold_bars: self.max_hold_bars,
            trade_cost: self.trade_cost,
            risk_per_trade: self.risk_per_trade,
            initial_capital: self.initial_capital,
        }
    }

    pub fn grid(&self) -> ParamGrid {
        ParamGrid::new(self.thresholds.clone(), self.stop_levels.clone())
    }
}

/// Feature/label dataset configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Label horizon in bars
    pub future_days: usize,
    /// Move (fraction of close) that makes a positive label
    pub target_move: f64,
    /// Tickers with fewer candles are skipped
    pub min_history: usize,
    pub benchmark: String,
    pub regime_sma: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        DatasetConfig {
            future_days: 5,
            target_move: 0.03,
            min_history: 200,
            benchmark: "SPY".to_string(),
            regime_sma: crate::regime::DEFAULT_REGIME_SMA,
        }
    }
}

/// Daily scanner / execution plan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub threshold_shares: f64,
    pub threshold_options: f64,
    pub risk_shares: f64,
    pub risk_options: f64,
    pub account_size: f64,
    pub max_hold_days: u32,
    pub atr_period: usize,
    pub atr_multiplier: f64,
    /// Target distance in multiples of the stop distance
    pub reward_multiple: f64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            threshold_shares: 0.75,
            threshold_options: 0.80,
            risk_shares: 0.02,
            risk_options: 0.03,
            account_size: 3_000.0,
            max_hold_days: 5,
            atr_period: 14,
            atr_multiplier: 1.5,
            reward_multiple: 2.0,
        }
    }
}

/// Chat bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<i64>,
    pub poll_interval_secs: u64,
    /// Long-poll timeout passed to the messaging API
    pub long_poll_secs: u64,
    /// Local time (HH:MM) after which the daily scan is pushed
    pub alert_time: String,
    pub weekdays_only: bool,
    pub scan_timeout_secs: u64,
    pub state_db: String,
    pub recap_size: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        BotConfig {
            token: None,
            chat_id: None,
            poll_interval_secs: 5,
            long_poll_secs: 20,
            alert_time: "16:15".to_string(),
            weekdays_only: true,
            scan_timeout_secs: 120,
            state_db: "state/bot.db".to_string(),
            recap_size: 10,
        }
    }
}

impl BotConfig {
    pub fn alert_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.alert_time, "%H:%M")
            .with_context(|| format!("Invalid bot alert_time: {}", self.alert_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config = serde_json::from_str(
            r#"{ "backtest": { "thresholds": [0.6], "stop_levels": [0.05], "max_hold_bars": 3,
                 "trade_cost": 0.001, "risk_per_trade": 0.02, "initial_capital": 5000 } }"#,
        )
        .unwrap();

        assert_eq!(config.backtest.max_hold_bars, 3);
        assert_eq!(config.backtest.out_of_sample_years, None);
        assert_eq!(config.scanner.threshold_shares, 0.75);
        assert_eq!(config.backtest.grid().total_combinations(), 1);
    }

    #[test]
    fn test_invalid_alert_time_rejected() {
        let mut config = Config::default();
        config.bot.alert_time = "25:99".to_string();
        assert!(config.validate().is_err());
    }
}
