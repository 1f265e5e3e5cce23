//! Robustness backtest over a (probability threshold x stop-loss) grid
//!
//! Every grid cell replays the same scored bar stream from scratch with its
//! own capital ledger and trade log. Cells share nothing but the read-only
//! bars, so they are evaluated in parallel with Rayon; results come back in
//! grid order either way.

use indicatif::ProgressBar;
use itertools::Itertools;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info};

use crate::selector::select_bar;
use crate::simulator::{simulate, Position};
use crate::{ConfigurationResult, Direction, ExitReason, MarketBar, Ticker, TradeOutcome};

/// Errors raised before a grid scan starts
#[derive(Debug, Error, PartialEq)]
pub enum BacktestError {
    #[error("bars for {ticker} are not in ascending date order: {current} follows {previous}")]
    InputOrderingViolation {
        ticker: Ticker,
        previous: chrono::NaiveDate,
        current: chrono::NaiveDate,
    },

    #[error("bars for {0} are split into more than one block; sort by (ticker, date)")]
    SplitTicker(Ticker),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Simulation parameters shared by every grid cell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationParams {
    pub max_hold_bars: usize,
    /// Round-trip cost deducted once per trade, as a fraction
    pub trade_cost: f64,
    pub risk_per_trade: f64,
    pub initial_capital: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            max_hold_bars: 5,
            trade_cost: 0.002,
            risk_per_trade: 0.01,
            initial_capital: 100_000.0,
        }
    }
}

impl SimulationParams {
    pub fn validate(&self) -> Result<(), BacktestError> {
        if self.max_hold_bars == 0 {
            return Err(BacktestError::InvalidParameter(
                "max_hold_bars must be > 0".to_string(),
            ));
        }
        if !(self.trade_cost >= 0.0 && self.trade_cost.is_finite()) {
            return Err(BacktestError::InvalidParameter(format!(
                "trade_cost must be >= 0, got {}",
                self.trade_cost
            )));
        }
        if !(self.risk_per_trade > 0.0 && self.risk_per_trade < 1.0) {
            return Err(BacktestError::InvalidParameter(format!(
                "risk_per_trade must be in (0, 1), got {}",
                self.risk_per_trade
            )));
        }
        if !(self.initial_capital > 0.0 && self.initial_capital.is_finite()) {
            return Err(BacktestError::InvalidParameter(format!(
                "initial_capital must be > 0, got {}",
                self.initial_capital
            )));
        }
        Ok(())
    }
}

/// Threshold and stop-loss levels to sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamGrid {
    pub thresholds: Vec<f64>,
    pub stop_levels: Vec<f64>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        ParamGrid {
            thresholds: vec![0.65, 0.70, 0.75, 0.80],
            stop_levels: vec![0.02, 0.03, 0.04],
        }
    }
}

impl ParamGrid {
    pub fn new(thresholds: Vec<f64>, stop_levels: Vec<f64>) -> Self {
        ParamGrid {
            thresholds,
            stop_levels,
        }
    }

    pub fn validate(&self) -> Result<(), BacktestError> {
        if self.thresholds.is_empty() || self.stop_levels.is_empty() {
            return Err(BacktestError::InvalidParameter(
                "grid needs at least one threshold and one stop level".to_string(),
            ));
        }
        if let Some(t) = self.thresholds.iter().find(|t| !(0.0..=1.0).contains(*t)) {
            return Err(BacktestError::InvalidParameter(format!(
                "threshold must be in [0, 1], got {}",
                t
            )));
        }
        if let Some(s) = self.stop_levels.iter().find(|s| !(**s > 0.0 && **s < 1.0)) {
            return Err(BacktestError::InvalidParameter(format!(
                "stop level must be in (0, 1), got {}",
                s
            )));
        }
        Ok(())
    }

    /// All (threshold, stop) cells: thresholds outer, stops inner, duplicates dropped
    pub fn cells(&self) -> Vec<(f64, f64)> {
        let thresholds = self.thresholds.iter().copied().unique_by(|t| OrderedFloat(*t));
        let stops: Vec<f64> = self
            .stop_levels
            .iter()
            .copied()
            .unique_by(|s| OrderedFloat(*s))
            .collect();

        thresholds.cartesian_product(stops).collect()
    }

    pub fn total_combinations(&self) -> usize {
        self.cells().len()
    }
}

/// Check that bars are grouped by ticker and ascend strictly by date within each group
pub fn validate_ordering(bars: &[MarketBar]) -> Result<(), BacktestError> {
    let mut finished: HashSet<&Ticker> = HashSet::new();

    for (prev, curr) in bars.iter().tuple_windows() {
        if prev.ticker == curr.ticker {
            if curr.date <= prev.date {
                return Err(BacktestError::InputOrderingViolation {
                    ticker: curr.ticker.clone(),
                    previous: prev.date,
                    current: curr.date,
                });
            }
        } else {
            finished.insert(&prev.ticker);
            if finished.contains(&curr.ticker) {
                return Err(BacktestError::SplitTicker(curr.ticker.clone()));
            }
        }
    }

    Ok(())
}

/// Forward bars for an entry at `index`: up to `max_hold_bars` following bars
/// of the same ticker
pub fn forward_window(bars: &[MarketBar], index: usize, max_hold_bars: usize) -> &[MarketBar] {
    let start = index + 1;
    let end = (start + max_hold_bars).min(bars.len());
    if start >= end {
        return &[];
    }

    let ticker = &bars[index].ticker;
    let same_ticker = bars[start..end]
        .iter()
        .take_while(|b| &b.ticker == ticker)
        .count();

    &bars[start..start + same_ticker]
}

fn is_usable_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Raw output of one grid cell
#[derive(Debug, Clone, PartialEq)]
pub struct CellRun {
    pub threshold: f64,
    pub stop_pct: f64,
    pub trades: Vec<TradeOutcome>,
    pub ending_capital: f64,
}

impl CellRun {
    /// Summary statistics; `None` for a cell that never traded
    pub fn summarize(&self) -> Option<ConfigurationResult> {
        if self.trades.is_empty() {
            return None;
        }

        let returns: Vec<f64> = self.trades.iter().map(|t| t.return_pct).collect();
        let trade_count = returns.len();
        let wins = self.trades.iter().filter(|t| t.is_win()).count();

        let gross_wins: f64 = returns.iter().filter(|r| **r > 0.0).sum();
        let gross_losses: f64 = returns.iter().filter(|r| **r < 0.0).map(|r| r.abs()).sum();
        let profit_factor = if gross_losses > 0.0 {
            Some(gross_wins / gross_losses)
        } else {
            None
        };

        let return_std_dev = if trade_count >= 2 {
            Some(returns.iter().std_dev())
        } else {
            None
        };

        Some(ConfigurationResult {
            threshold: self.threshold,
            stop_pct: self.stop_pct,
            trade_count,
            win_rate: wins as f64 / trade_count as f64,
            expectancy: returns.iter().mean(),
            ending_capital: self.ending_capital,
            long_trades: self
                .trades
                .iter()
                .filter(|t| t.direction == Direction::Long)
                .count(),
            short_trades: self
                .trades
                .iter()
                .filter(|t| t.direction == Direction::Short)
                .count(),
            stop_exits: self
                .trades
                .iter()
                .filter(|t| t.exit_reason == ExitReason::StopLoss)
                .count(),
            profit_factor,
            return_std_dev,
        })
    }
}

/// Results of a full grid sweep
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridReport {
    /// Cells with at least one trade, in grid order
    pub results: Vec<ConfigurationResult>,
    /// Cells that never traded
    pub empty_cells: Vec<(f64, f64)>,
}

impl GridReport {
    fn from_runs(runs: &[CellRun]) -> Self {
        let mut report = GridReport::default();
        for run in runs {
            match run.summarize() {
                Some(result) => report.results.push(result),
                None => report.empty_cells.push((run.threshold, run.stop_pct)),
            }
        }
        report
    }

    /// Best cell by expectancy
    pub fn best(&self) -> Option<&ConfigurationResult> {
        self.results
            .iter()
            .max_by_key(|r| OrderedFloat(r.expectancy))
    }
}

/// Grid aggregator over a scored bar stream
pub struct GridAggregator {
    params: SimulationParams,
    grid: ParamGrid,
}

impl GridAggregator {
    pub fn new(params: SimulationParams, grid: ParamGrid) -> Result<Self, BacktestError> {
        params.validate()?;
        grid.validate()?;
        Ok(GridAggregator { params, grid })
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn grid(&self) -> &ParamGrid {
        &self.grid
    }

    /// Replay the bar stream for one (threshold, stop) cell
    pub fn run_cell(&self, bars: &[MarketBar], threshold: f64, stop_pct: f64) -> CellRun {
        let max_hold = self.params.max_hold_bars;
        let mut capital = self.params.initial_capital;
        let mut trades = Vec::new();

        for (i, bar) in bars
            .iter()
            .enumerate()
            .take(bars.len().saturating_sub(max_hold))
        {
            let Some(direction) = select_bar(bar, threshold).direction() else {
                continue;
            };
            if !is_usable_price(bar.close) {
                debug!(
                    "Skipping {} {} on {}: unusable entry close {}",
                    direction, bar.ticker, bar.date, bar.close
                );
                continue;
            }

            let forward = forward_window(bars, i, max_hold);
            let usable = forward
                .iter()
                .take_while(|b| is_usable_price(b.close))
                .count();
            if usable < forward.len() {
                debug!(
                    "Truncating {} {} window on {}: unusable close on {}",
                    direction, bar.ticker, bar.date, forward[usable].date
                );
            }
            let forward = &forward[..usable];
            let Some(outcome) = simulate(
                bar,
                direction,
                stop_pct,
                max_hold,
                forward,
                self.params.trade_cost,
            ) else {
                debug!(
                    "Skipping {} {} on {}: no forward bars",
                    direction, bar.ticker, bar.date
                );
                continue;
            };

            let position = Position::open(
                direction,
                i,
                bar.close,
                stop_pct,
                capital,
                self.params.risk_per_trade,
            );
            capital += position.profit(outcome.return_pct);
            trades.push(outcome);
        }

        CellRun {
            threshold,
            stop_pct,
            trades,
            ending_capital: capital,
        }
    }

    /// Run every cell in parallel
    pub fn run(&self, bars: &[MarketBar]) -> Result<GridReport, BacktestError> {
        self.run_with(bars, false, None)
    }

    /// Run every cell one after another
    pub fn run_sequential(&self, bars: &[MarketBar]) -> Result<GridReport, BacktestError> {
        self.run_with(bars, true, None)
    }

    /// Run every cell, ticking `progress` once per finished cell
    pub fn run_with_progress(
        &self,
        bars: &[MarketBar],
        sequential: bool,
        progress: ProgressBar,
    ) -> Result<GridReport, BacktestError> {
        self.run_with(bars, sequential, Some(progress))
    }

    /// Per-cell trade logs, in grid order
    pub fn run_cells(&self, bars: &[MarketBar], sequential: bool) -> Result<Vec<CellRun>, BacktestError> {
        validate_ordering(bars)?;
        let cells = self.grid.cells();
        Ok(self.execute(bars, &cells, sequential, None))
    }

    fn run_with(
        &self,
        bars: &[MarketBar],
        sequential: bool,
        progress: Option<ProgressBar>,
    ) -> Result<GridReport, BacktestError> {
        validate_ordering(bars)?;

        let cells = self.grid.cells();
        info!(
            "Testing {} threshold/stop combinations over {} bars",
            cells.len(),
            bars.len()
        );

        let runs = self.execute(bars, &cells, sequential, progress.as_ref());
        let report = GridReport::from_runs(&runs);

        if let Some(pb) = progress {
            pb.finish_with_message(format!("{} with trades", report.results.len()));
        }
        info!(
            "Grid finished: {} cells with trades, {} without",
            report.results.len(),
            report.empty_cells.len()
        );

        Ok(report)
    }

    fn execute(
        &self,
        bars: &[MarketBar],
        cells: &[(f64, f64)],
        sequential: bool,
        progress: Option<&ProgressBar>,
    ) -> Vec<CellRun> {
        let run = |&(threshold, stop_pct): &(f64, f64)| {
            let cell = self.run_cell(bars, threshold, stop_pct);
            if let Some(pb) = progress {
                pb.inc(1);
            }
            cell
        };

        if sequential {
            cells.iter().map(run).collect()
        } else {
            cells.par_iter().map(run).collect()
        }
    }
}
