//! Position simulation
//!
//! Walks a single position forward over a bounded window of bars. Stops are
//! checked against closes only (no intrabar wicks) and fill at the stop
//! price itself; a position that survives the window exits at the last
//! close. A flat round-trip cost is deducted once per trade.

use crate::{Direction, ExitReason, MarketBar, TradeOutcome};

/// An open simulated position
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub direction: Direction,
    pub entry_index: usize,
    pub entry_price: f64,
    /// Stop distance as a fraction of the entry price
    pub stop_pct: f64,
    pub size_shares: f64,
}

impl Position {
    /// Open a position sized so that a stop-out loses `capital * risk_per_trade`
    pub fn open(
        direction: Direction,
        entry_index: usize,
        entry_price: f64,
        stop_pct: f64,
        capital: f64,
        risk_per_trade: f64,
    ) -> Self {
        Position {
            direction,
            entry_index,
            entry_price,
            stop_pct,
            size_shares: position_size(capital, risk_per_trade, entry_price, stop_pct),
        }
    }

    pub fn stop_price(&self) -> f64 {
        stop_price(self.direction, self.entry_price, self.stop_pct)
    }

    /// Realized profit in currency for a cost-adjusted fractional return
    pub fn profit(&self, return_pct: f64) -> f64 {
        self.size_shares * self.entry_price * return_pct
    }
}

/// Fixed fractional sizing: shares such that the stop distance risks
/// `capital * risk_per_trade`. Zero when the stop distance is not positive.
pub fn position_size(capital: f64, risk_per_trade: f64, entry_price: f64, stop_pct: f64) -> f64 {
    let risk_amount = capital * risk_per_trade;
    let stop_distance = entry_price * stop_pct;
    if stop_distance <= 0.0 || !stop_distance.is_finite() {
        return 0.0;
    }
    risk_amount / stop_distance
}

/// Stop trigger level for a position
pub fn stop_price(direction: Direction, entry_price: f64, stop_pct: f64) -> f64 {
    match direction {
        Direction::Long => entry_price * (1.0 - stop_pct),
        Direction::Short => entry_price * (1.0 + stop_pct),
    }
}

/// Directional return before costs
pub fn raw_return(direction: Direction, entry_price: f64, exit_price: f64) -> f64 {
    match direction {
        Direction::Long => (exit_price - entry_price) / entry_price,
        Direction::Short => (entry_price - exit_price) / entry_price,
    }
}

fn stop_hit(direction: Direction, close: f64, stop: f64) -> bool {
    match direction {
        Direction::Long => close <= stop,
        Direction::Short => close >= stop,
    }
}

/// Simulate one trade entered at `entry.close`.
///
/// `forward` holds the bars after the entry bar; at most `max_hold_bars` of
/// them are walked. Returns `None` when there is no forward bar at all, in
/// which case the candidate must be skipped.
pub fn simulate(
    entry: &MarketBar,
    direction: Direction,
    stop_pct: f64,
    max_hold_bars: usize,
    forward: &[MarketBar],
    trade_cost: f64,
) -> Option<TradeOutcome> {
    let window = &forward[..forward.len().min(max_hold_bars)];
    let last = window.last()?;

    let entry_price = entry.close;
    let stop = stop_price(direction, entry_price, stop_pct);

    let (exit_price, exit_reason, bars_held) = window
        .iter()
        .position(|bar| stop_hit(direction, bar.close, stop))
        .map(|idx| (stop, ExitReason::StopLoss, idx + 1))
        .unwrap_or((last.close, ExitReason::TimeExit, window.len()));

    let return_pct = raw_return(direction, entry_price, exit_price) - trade_cost;

    Some(TradeOutcome {
        ticker: entry.ticker.clone(),
        direction,
        entry_date: entry.date,
        entry_price,
        exit_price,
        return_pct,
        exit_reason,
        bars_held,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Regime, Ticker};
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};

    fn bars(closes: &[f64]) -> Vec<MarketBar> {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| MarketBar {
                date: start + Duration::days(i as i64),
                ticker: Ticker::new("AAPL"),
                close,
                high: close + 1.0,
                low: close - 1.0,
                long_prob: 0.5,
                short_prob: 0.5,
                regime: Some(Regime::Bull),
            })
            .collect()
    }

    #[test]
    fn test_long_stop_fills_at_stop_price() {
        let series = bars(&[100.0, 99.0, 98.0, 96.9, 95.0, 94.0]);
        let outcome = simulate(&series[0], Direction::Long, 0.03, 5, &series[1..], 0.0).unwrap();

        assert_eq!(outcome.exit_reason, ExitReason::StopLoss);
        assert_eq!(outcome.bars_held, 3);
        assert_relative_eq!(outcome.exit_price, 97.0, epsilon = 1e-9);
        assert_relative_eq!(outcome.return_pct, -0.03, epsilon = 1e-9);
    }

    #[test]
    fn test_long_time_exit_at_last_close() {
        let series = bars(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0]);
        let outcome = simulate(&series[0], Direction::Long, 0.03, 5, &series[1..], 0.002).unwrap();

        assert_eq!(outcome.exit_reason, ExitReason::TimeExit);
        assert_eq!(outcome.bars_held, 5);
        assert_relative_eq!(outcome.exit_price, 105.0);
        assert_relative_eq!(outcome.return_pct, 0.05 - 0.002, epsilon = 1e-12);
    }

    #[test]
    fn test_short_stop_and_return_sign() {
        let series = bars(&[50.0, 50.5, 51.6, 49.0]);
        let outcome = simulate(&series[0], Direction::Short, 0.03, 5, &series[1..], 0.0).unwrap();

        assert_eq!(outcome.exit_reason, ExitReason::StopLoss);
        assert_relative_eq!(outcome.exit_price, 51.5, epsilon = 1e-9);
        assert!(outcome.return_pct < 0.0);

        let falling = bars(&[50.0, 49.0, 48.0]);
        let outcome = simulate(&falling[0], Direction::Short, 0.03, 5, &falling[1..], 0.0).unwrap();
        assert_eq!(outcome.exit_reason, ExitReason::TimeExit);
        assert_relative_eq!(outcome.return_pct, 0.04, epsilon = 1e-12);
    }

    #[test]
    fn test_short_window_uses_available_bars() {
        let series = bars(&[100.0, 101.0, 102.0]);
        let outcome = simulate(&series[0], Direction::Long, 0.05, 5, &series[1..], 0.0).unwrap();
        assert_eq!(outcome.bars_held, 2);
        assert_relative_eq!(outcome.exit_price, 102.0);
    }

    #[test]
    fn test_window_is_capped_at_max_hold() {
        let series = bars(&[100.0, 101.0, 102.0, 80.0]);
        let outcome = simulate(&series[0], Direction::Long, 0.05, 2, &series[1..], 0.0).unwrap();
        assert_eq!(outcome.exit_reason, ExitReason::TimeExit);
        assert_relative_eq!(outcome.exit_price, 102.0);
    }

    #[test]
    fn test_no_forward_bars_is_skipped() {
        let series = bars(&[100.0]);
        assert!(simulate(&series[0], Direction::Long, 0.03, 5, &[], 0.0).is_none());
    }

    #[test]
    fn test_position_sizing_risks_fixed_fraction() {
        let position = Position::open(Direction::Long, 0, 100.0, 0.02, 100_000.0, 0.01);
        // 1,000 at risk over a 2.0 stop distance
        assert_relative_eq!(position.size_shares, 500.0);
        assert_relative_eq!(position.stop_price(), 98.0);
        assert_relative_eq!(position.profit(-0.02), -1_000.0, epsilon = 1e-9);
        assert_eq!(position_size(1_000.0, 0.01, 100.0, 0.0), 0.0);
    }
}
