//! Swing Signals
//!
//! Research and alerting toolkit for daily equity swing trades: builds a
//! labeled feature dataset, replays an externally scored table through a
//! (probability threshold × stop-loss) robustness grid, picks today's best
//! setup and pushes scans and market recaps through a chat bot.
//!
//! The backtest core is synchronous and pure:
//! [`selector`] decides entries, [`simulator`] walks one trade forward and
//! [`backtest::GridAggregator`] folds every grid cell over the bar stream.
//!
//! ```no_run
//! use swing_signals::backtest::{GridAggregator, ParamGrid, SimulationParams};
//! use swing_signals::data;
//!
//! fn main() -> anyhow::Result<()> {
//!     let bars = data::load_bars("scored.csv")?;
//!     let aggregator = GridAggregator::new(SimulationParams::default(), ParamGrid::default())?;
//!     let report = aggregator.run(&bars)?;
//!     for line in report.results.iter().map(swing_signals::report::format_line) {
//!         println!("{}", line);
//!     }
//!     Ok(())
//! }
//! ```

pub mod backtest;
pub mod bot;
pub mod config;
pub mod data;
pub mod dataset;
pub mod indicators;
pub mod monthly;
pub mod recap;
pub mod regime;
pub mod report;
pub mod scanner;
pub mod selector;
pub mod simulator;
pub mod state;
pub mod telegram;
pub mod types;

pub use backtest::{BacktestError, GridAggregator, GridReport, ParamGrid, SimulationParams};
pub use config::Config;
pub use monthly::MonthlyBreakdown;
pub use recap::MoversReport;
pub use scanner::{ExecutionPlan, ScanError, ScanOutcome};
pub use types::*;
