//! Daily "best trade" scanner
//!
//! Runs the candidate selector over the latest bar of every ticker, keeps
//! the most confident candidate and turns it into an execution plan with an
//! ATR stop, a reward-multiple target and risk-based share count.

use serde::Serialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, ScannerConfig};
use crate::data;
use crate::indicators;
use crate::regime::RegimeSeries;
use crate::selector;
use crate::{Direction, MarketBar, Regime, Ticker};

#[derive(Debug, Error, PartialEq)]
pub enum ScanError {
    #[error("scored table is empty")]
    EmptyTable,

    #[error("{ticker}: {available} bars of history, ATR({required}) needs {required}")]
    InsufficientHistory {
        ticker: Ticker,
        available: usize,
        required: usize,
    },
}

/// A ticker that passed the selector on its latest bar
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub ticker: Ticker,
    pub direction: Direction,
    pub probability: f64,
    pub regime: Regime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionKind {
    Call,
    Put,
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionKind::Call => write!(f, "CALL"),
            OptionKind::Put => write!(f, "PUT"),
        }
    }
}

/// Options overlay offered for very high-probability setups
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionsBoost {
    pub kind: OptionKind,
    pub risk: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionPlan {
    pub date: chrono::NaiveDate,
    pub regime: Regime,
    pub ticker: Ticker,
    pub direction: Direction,
    pub probability: f64,
    pub atr: f64,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub shares: u64,
    pub max_risk: f64,
    pub max_hold_days: u32,
    pub options: Option<OptionsBoost>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ScanOutcome {
    NoTrade,
    Plan(ExecutionPlan),
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Candidates from the latest bars, most confident first.
///
/// `market_regime` overrides each bar's own regime when given.
pub fn candidates(
    latest: &[&MarketBar],
    market_regime: Option<Regime>,
    threshold: f64,
) -> Vec<Candidate> {
    let mut found: Vec<Candidate> = latest
        .iter()
        .filter_map(|bar| {
            let regime = market_regime.or(bar.regime)?;
            let signal = selector::select(Some(regime), bar.long_prob, bar.short_prob, threshold);
            let direction = signal.direction()?;
            let probability = selector::signal_probability(bar, signal)?;
            Some(Candidate {
                ticker: bar.ticker.clone(),
                direction,
                probability,
                regime,
            })
        })
        .collect();

    // Stable sort keeps ticker order among equal probabilities
    found.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    found
}

/// Build the execution plan for one candidate from its price history
pub fn build_plan(
    candidate: &Candidate,
    history: &[&MarketBar],
    config: &ScannerConfig,
) -> Result<ExecutionPlan, ScanError> {
    let insufficient = || ScanError::InsufficientHistory {
        ticker: candidate.ticker.clone(),
        available: history.len(),
        required: config.atr_period,
    };

    let last = history.last().ok_or_else(insufficient)?;
    let high: Vec<f64> = history.iter().map(|b| b.high).collect();
    let low: Vec<f64> = history.iter().map(|b| b.low).collect();
    let close: Vec<f64> = history.iter().map(|b| b.close).collect();

    let atr = indicators::atr(&high, &low, &close, config.atr_period)
        .last()
        .copied()
        .flatten()
        .ok_or_else(insufficient)?;

    let price = last.close;
    let stop_distance = atr * config.atr_multiplier;
    let reward = stop_distance * config.reward_multiple;

    let (stop_price, target_price) = match candidate.direction {
        Direction::Long => (round2(price - stop_distance), round2(price + reward)),
        Direction::Short => (round2(price + stop_distance), round2(price - reward)),
    };

    let max_risk = config.account_size * config.risk_shares;
    let risk_per_share = (price - stop_price).abs();
    let shares = if risk_per_share > 0.0 {
        (max_risk / risk_per_share).floor() as u64
    } else {
        0
    };

    let options = (candidate.probability >= config.threshold_options).then(|| OptionsBoost {
        kind: match candidate.direction {
            Direction::Long => OptionKind::Call,
            Direction::Short => OptionKind::Put,
        },
        risk: round2(config.account_size * config.risk_options),
    });

    Ok(ExecutionPlan {
        date: last.date,
        regime: candidate.regime,
        ticker: candidate.ticker.clone(),
        direction: candidate.direction,
        probability: candidate.probability,
        atr,
        entry_price: price,
        stop_price,
        target_price,
        shares,
        max_risk: round2(max_risk),
        max_hold_days: config.max_hold_days,
        options,
    })
}

/// Scan the scored table for today's best trade
pub fn scan(
    bars: &[MarketBar],
    market_regime: Option<Regime>,
    config: &ScannerConfig,
) -> Result<ScanOutcome, ScanError> {
    if bars.is_empty() {
        return Err(ScanError::EmptyTable);
    }

    let latest = data::latest_by_ticker(bars);
    let found = candidates(&latest, market_regime, config.threshold_shares);
    debug!(
        "{} candidates from {} tickers at threshold {:.2}",
        found.len(),
        latest.len(),
        config.threshold_shares
    );

    let Some(best) = found.first() else {
        info!("No candidate cleared {:.2}", config.threshold_shares);
        return Ok(ScanOutcome::NoTrade);
    };

    let mut history = data::history_for(bars, &best.ticker);
    history.sort_by_key(|b| b.date);

    let plan = build_plan(best, &history, config)?;
    info!(
        "Best setup: {} {} at {:.1}%",
        plan.ticker,
        plan.direction,
        plan.probability * 100.0
    );
    Ok(ScanOutcome::Plan(plan))
}

/// Current regime from the benchmark candles in the data directory
pub fn market_regime(config: &Config) -> Option<Regime> {
    let path = Path::new(&config.data.candles_dir).join(format!("{}.csv", config.dataset.benchmark));
    match data::load_candles(&path) {
        Ok(candles) => {
            let series = RegimeSeries::from_benchmark(&candles, config.dataset.regime_sma);
            let (date, regime) = series.latest()?;
            info!("Market regime {} as of {}", regime, date);
            Some(regime)
        }
        Err(e) => {
            warn!("No benchmark data ({:#}); using per-row regimes", e);
            None
        }
    }
}

/// Load the scored table and benchmark named in `config` and scan
pub fn scan_from_config(config: &Config) -> anyhow::Result<ScanOutcome> {
    let bars = data::load_bars(&config.data.scored_path)?;
    let regime = market_regime(config);
    Ok(scan(&bars, regime, &config.scanner)?)
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(30);
        writeln!(f, "{}", rule)?;
        writeln!(f, "EXECUTION PLAN ({})", self.date)?;
        writeln!(f, "{}", rule)?;
        writeln!(f)?;
        writeln!(f, "Market Regime: {}", self.regime)?;
        writeln!(f, "Ticker: {}", self.ticker)?;
        writeln!(f, "Signal: {}", self.direction)?;
        writeln!(f, "Probability: {:.2}%", self.probability * 100.0)?;
        writeln!(f, "ATR: {:.2}", self.atr)?;
        writeln!(f)?;
        writeln!(f, "------ SHARES TRADE ------")?;
        writeln!(f, "Entry Price: {:.2}", self.entry_price)?;
        writeln!(f, "ATR Stop: {:.2}", self.stop_price)?;
        writeln!(f, "Target: {:.2}", self.target_price)?;
        writeln!(f, "Shares: {}", self.shares)?;
        writeln!(f, "Max Risk: ${:.2}", self.max_risk)?;
        writeln!(f, "Max Hold: {} days", self.max_hold_days)?;

        if let Some(boost) = &self.options {
            writeln!(f)?;
            writeln!(f, "------ OPTIONS BOOST ------")?;
            writeln!(f, "Type: {}", boost.kind)?;
            writeln!(f, "Expiration: 10-21 days out")?;
            writeln!(f, "Strike: ATM")?;
            writeln!(f, "Risk: ${:.2}", boost.risk)?;
            writeln!(f, "Exit: +100% gain or -50% loss")?;
        }

        writeln!(f)?;
        writeln!(f, "Trailing Stop Rules:")?;
        writeln!(f, "- Move stop to breakeven at 1R")?;
        writeln!(f, "- Trail 1 ATR once in profit")?;
        write!(f, "{}", rule)
    }
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanOutcome::NoTrade => write!(f, "No high-quality trade today."),
            ScanOutcome::Plan(plan) => plan.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};

    fn series(ticker: &str, count: usize, long_prob: f64, short_prob: f64) -> Vec<MarketBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..count)
            .map(|i| MarketBar {
                date: start + Duration::days(i as i64),
                ticker: Ticker::new(ticker),
                close: 100.0,
                high: 101.0,
                low: 99.0,
                long_prob,
                short_prob,
                regime: Some(Regime::Bull),
            })
            .collect()
    }

    #[test]
    fn test_empty_table() {
        assert_eq!(
            scan(&[], None, &ScannerConfig::default()),
            Err(ScanError::EmptyTable)
        );
    }

    #[test]
    fn test_no_candidate() {
        let bars = series("AAPL", 20, 0.60, 0.90);
        let outcome = scan(&bars, None, &ScannerConfig::default()).unwrap();
        assert_eq!(outcome, ScanOutcome::NoTrade);
        assert_eq!(outcome.to_string(), "No high-quality trade today.");
    }

    #[test]
    fn test_market_regime_overrides_bar_regime() {
        let bars = series("AAPL", 20, 0.60, 0.90);
        let outcome = scan(&bars, Some(Regime::Bear), &ScannerConfig::default()).unwrap();
        let ScanOutcome::Plan(plan) = outcome else {
            panic!("expected a plan");
        };
        assert_eq!(plan.direction, Direction::Short);
        assert_eq!(plan.options.as_ref().map(|o| o.kind), Some(OptionKind::Put));
    }

    #[test]
    fn test_plan_levels_and_sizing() {
        let mut bars = series("MSFT", 20, 0.78, 0.10);
        bars.extend(series("AAPL", 20, 0.76, 0.10));
        let config = ScannerConfig::default();

        let ScanOutcome::Plan(plan) = scan(&bars, None, &config).unwrap() else {
            panic!("expected a plan");
        };

        // Constant 2.0 true range: stop 3.0 below, target 6.0 above
        assert_eq!(plan.ticker, Ticker::new("MSFT"));
        assert_relative_eq!(plan.atr, 2.0);
        assert_relative_eq!(plan.stop_price, 97.0);
        assert_relative_eq!(plan.target_price, 106.0);
        // 3000 * 0.02 / 3.0
        assert_eq!(plan.shares, 20);
        assert!(plan.options.is_none());
        assert!(plan.to_string().contains("Ticker: MSFT"));
    }

    #[test]
    fn test_insufficient_history() {
        let bars = series("AAPL", 5, 0.90, 0.10);
        let err = scan(&bars, None, &ScannerConfig::default()).unwrap_err();
        assert!(matches!(err, ScanError::InsufficientHistory { available: 5, .. }));
    }
}
