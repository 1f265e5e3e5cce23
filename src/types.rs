//! Core data types used across the toolkit

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for OHLCV candle data
#[derive(Debug, Error)]
pub enum BarValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("prices must be positive and finite: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// Daily OHLCV candle for one ticker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Create a new candle with validation
    pub fn new(
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, BarValidationError> {
        let candle = Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        };
        candle.validate()?;
        Ok(candle)
    }

    /// Validate the candle data
    ///
    /// Open and close are allowed outside `[low, high]`; vendor adjusted
    /// series regularly violate that by a rounding hair.
    pub fn validate(&self) -> Result<(), BarValidationError> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(BarValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(BarValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(BarValidationError::NegativeVolume(self.volume));
        }

        Ok(())
    }
}

/// Equity ticker symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticker(pub String);

impl Ticker {
    pub fn new(s: impl Into<String>) -> Self {
        Ticker(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Broad market regime, derived from a benchmark index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Regime {
    Bull,
    Bear,
}

impl std::str::FromStr for Regime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BULL" => Ok(Regime::Bull),
            "BEAR" => Ok(Regime::Bear),
            other => Err(format!("Unknown regime: {}", other)),
        }
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Regime::Bull => write!(f, "BULL"),
            Regime::Bear => write!(f, "BEAR"),
        }
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Entry decision for a single bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Long,
    Short,
    NoTrade,
}

impl Signal {
    pub fn direction(self) -> Option<Direction> {
        match self {
            Signal::Long => Some(Direction::Long),
            Signal::Short => Some(Direction::Short),
            Signal::NoTrade => None,
        }
    }
}

/// One scored row of the research table: prices, model probabilities and regime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketBar {
    pub date: NaiveDate,
    pub ticker: Ticker,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub long_prob: f64,
    pub short_prob: f64,
    pub regime: Option<Regime>,
}

/// How a simulated trade was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TimeExit,
}

/// Result of one simulated trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub ticker: Ticker,
    pub direction: Direction,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Fractional return after the round-trip cost
    pub return_pct: f64,
    pub exit_reason: ExitReason,
    pub bars_held: usize,
}

impl TradeOutcome {
    pub fn is_win(&self) -> bool {
        self.return_pct > 0.0
    }
}

/// Summary of one (threshold, stop) grid cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationResult {
    pub threshold: f64,
    pub stop_pct: f64,
    pub trade_count: usize,
    /// Fraction of trades with a positive return, in `[0, 1]`
    pub win_rate: f64,
    /// Mean cost-adjusted return per trade
    pub expectancy: f64,
    pub ending_capital: f64,
    pub long_trades: usize,
    pub short_trades: usize,
    pub stop_exits: usize,
    /// Gross wins over gross losses; `None` when no trade lost
    pub profit_factor: Option<f64>,
    /// Sample standard deviation of returns; `None` below two trades
    pub return_std_dev: Option<f64>,
}
